use crate::types::{ApiResponse, EmptyData};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

/// Application-specific error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("User not found: {0}")]
    NotFound(String),

    /// The transaction id was already applied; callers should re-query status.
    #[error("Purchase already processed for transaction {0}")]
    DuplicatePurchase(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// More than one ACTIVE entitlement row exists for a user.
    #[error("Invalid entitlement state: {0}")]
    InvalidState(String),

    #[error("Database connection failed")]
    DatabaseConnection,

    #[error("Database operation failed: {0}")]
    DatabaseOperation(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the appropriate HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicatePurchase(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,

            AppError::InvalidState(_)
            | AppError::DatabaseConnection
            | AppError::DatabaseOperation(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message
    fn message(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
            sentry::capture_error(&self);
        }

        let response_body = ApiResponse::<EmptyData>::error(self.message());

        (status_code, Json(response_body)).into_response()
    }
}

/// Result type for application operations
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types
impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        AppError::DatabaseOperation(err.to_string())
    }
}

impl From<diesel::ConnectionError> for AppError {
    fn from(err: diesel::ConnectionError) -> Self {
        tracing::error!(error = %err, "failed to open database connection");
        AppError::DatabaseConnection
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for AppError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(err.to_string())
    }
}
