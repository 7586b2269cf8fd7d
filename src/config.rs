//! Service configuration, read from the environment.

use std::env;

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub busy_timeout_ms: u64,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "billing.db".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let busy_timeout_ms = match env::var("DB_BUSY_TIMEOUT_MS") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid("DB_BUSY_TIMEOUT_MS"))?,
            Err(_) => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let sentry_dsn = env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty());

        Ok(Self {
            database_url,
            port,
            busy_timeout_ms,
            sentry_dsn,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
