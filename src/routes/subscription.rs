use crate::error::AppError;
use crate::types::{
    ApiResponse, EmptyData, SubscribeRequest, SubscriptionHistoryEntry,
    SubscriptionStatusResponse,
};
use crate::{orchestrator, query, AppState};
use axum::extract::{Path, State};
use axum::Json;

/// Apply a store purchase to the user's entitlement
#[utoipa::path(
    post,
    path = "/users/{user_id}/subscriptions",
    request_body = SubscribeRequest,
    params(("user_id" = String, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "Purchase applied", body = ApiResponse<SubscriptionStatusResponse>),
        (status = 400, description = "Invalid purchase fields", body = ApiResponse<EmptyData>),
        (status = 404, description = "Unknown user", body = ApiResponse<EmptyData>),
        (status = 409, description = "Transaction already processed; query status instead", body = ApiResponse<EmptyData>),
        (status = 500, description = "Internal server error", body = ApiResponse<EmptyData>)
    ),
    tag = "Subscriptions"
)]
pub async fn subscribe(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<SubscriptionStatusResponse>>, AppError> {
    let status = app_state
        .with_connection(move |conn| orchestrator::subscribe(conn, &user_id, &payload))
        .await?;

    Ok(Json(ApiResponse::ok(status)))
}

/// Soft-cancel the user's active subscription
#[utoipa::path(
    post,
    path = "/users/{user_id}/subscriptions/cancel",
    params(("user_id" = String, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "Post-cancel status, or no data when nothing was active", body = ApiResponse<SubscriptionStatusResponse>),
        (status = 404, description = "Unknown user", body = ApiResponse<EmptyData>),
        (status = 500, description = "Internal server error", body = ApiResponse<EmptyData>)
    ),
    tag = "Subscriptions"
)]
pub async fn cancel(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<SubscriptionStatusResponse>>, AppError> {
    let cancelled = app_state
        .with_connection(move |conn| orchestrator::cancel(conn, &user_id))
        .await?;

    Ok(Json(match cancelled {
        Some(status) => ApiResponse::ok(status),
        None => ApiResponse::ok_with_msg("No active subscription"),
    }))
}

/// Current entitlement, evaluated now
#[utoipa::path(
    get,
    path = "/users/{user_id}/subscriptions/status",
    params(("user_id" = String, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "Current status, or no data when nothing grants access", body = ApiResponse<SubscriptionStatusResponse>),
        (status = 404, description = "Unknown user", body = ApiResponse<EmptyData>)
    ),
    tag = "Subscriptions"
)]
pub async fn status(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<SubscriptionStatusResponse>>, AppError> {
    let current = app_state
        .with_connection(move |conn| query::status(conn, &user_id))
        .await?;

    Ok(Json(match current {
        Some(status) => ApiResponse::ok(status),
        None => ApiResponse::ok_with_msg("No active subscription"),
    }))
}

/// Every subscription the user has held, newest first
#[utoipa::path(
    get,
    path = "/users/{user_id}/subscriptions/history",
    params(("user_id" = String, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "Subscription history", body = ApiResponse<Vec<SubscriptionHistoryEntry>>),
        (status = 404, description = "Unknown user", body = ApiResponse<EmptyData>)
    ),
    tag = "Subscriptions"
)]
pub async fn history(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<SubscriptionHistoryEntry>>>, AppError> {
    let entries = app_state
        .with_connection(move |conn| query::history(conn, &user_id))
        .await?;

    Ok(Json(ApiResponse::ok(entries)))
}
