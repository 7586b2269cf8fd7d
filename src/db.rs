use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::AppResult;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Every subscribe/cancel queues on one database-wide write lock, so the wait
/// has to cover a burst of writers for unrelated users.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Open a connection with the pragmas the engine relies on. Writers queue on
/// the busy timeout instead of failing with `SQLITE_BUSY`.
pub fn establish_connection(
    database_url: &str,
    busy_timeout_ms: u64,
) -> AppResult<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)?;
    conn.batch_execute(&format!(
        "PRAGMA busy_timeout = {busy_timeout_ms}; PRAGMA foreign_keys = ON;"
    ))?;
    Ok(conn)
}

pub fn run_migrations(conn: &mut SqliteConnection) -> AppResult<()> {
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    tracing::info!(count = applied.len(), "database migrations completed");
    Ok(())
}
