pub mod config;
pub mod db;
pub mod entitlement;
pub mod error;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod routes;
pub mod schema;
pub mod store;
pub mod types;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::Config;
use diesel::sqlite::SqliteConnection;
use error::AppResult;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use types::{
    EmptyData, Platform, PurchaseLedgerEntry, SubscribeRequest, SubscriptionHistoryEntry,
    SubscriptionStatus, SubscriptionStatusResponse, SubscriptionTier, UserEntitlementResponse,
};
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    database_url: Arc<str>,
    busy_timeout_ms: u64,
}

impl AppState {
    pub fn new(database_url: impl Into<String>, busy_timeout_ms: u64) -> Self {
        Self {
            database_url: Arc::from(database_url.into()),
            busy_timeout_ms,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.database_url.clone(), config.busy_timeout_ms)
    }

    /// Get a database connection
    pub fn get_db_connection(&self) -> AppResult<SqliteConnection> {
        db::establish_connection(&self.database_url, self.busy_timeout_ms)
    }

    /// Run blocking diesel work on the blocking pool with a fresh connection.
    pub async fn with_connection<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = state.get_db_connection()?;
            f(&mut conn)
        })
        .await?
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::subscription::subscribe,
        routes::subscription::cancel,
        routes::subscription::status,
        routes::subscription::history,
        routes::entitlement::user_entitlement,
        routes::ledger::purchases,
        health_check
    ),
    components(
        schemas(EmptyData, SubscribeRequest, SubscriptionStatusResponse, SubscriptionHistoryEntry, UserEntitlementResponse, PurchaseLedgerEntry, SubscriptionTier, SubscriptionStatus, Platform)
    ),
    tags(
        (name = "Subscriptions", description = "Store purchase processing and entitlement queries"),
        (name = "Health", description = "Health check endpoints")
    ),
    info(
        title = "Focus Billing API",
        version = "1.0.0",
        description = "Entitlement engine turning mobile store purchases into subscription windows"
    )
)]
struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value)
    ),
    tag = "Health"
)]
async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(include_str!("../static/swagger.html"))
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/users/{user_id}/subscriptions",
            post(routes::subscription::subscribe),
        )
        .route(
            "/users/{user_id}/subscriptions/cancel",
            post(routes::subscription::cancel),
        )
        .route(
            "/users/{user_id}/subscriptions/status",
            get(routes::subscription::status),
        )
        .route(
            "/users/{user_id}/subscriptions/history",
            get(routes::subscription::history),
        )
        .route(
            "/users/{user_id}/entitlement",
            get(routes::entitlement::user_entitlement),
        )
        .route("/users/{user_id}/purchases", get(routes::ledger::purchases))
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/explore", get(swagger_ui))
        .with_state(app_state)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("focus_billing=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;

    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    // Run database migrations on startup
    let mut conn = db::establish_connection(&config.database_url, config.busy_timeout_ms)?;
    db::run_migrations(&mut conn)?;
    drop(conn);

    let app_state = AppState::from_config(&config);

    tokio::runtime::Runtime::new()?.block_on(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, database_url = %config.database_url, "listening");

        axum::serve(listener, app(app_state).into_make_service()).await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    })
}
