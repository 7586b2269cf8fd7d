use crate::error::AppError;
use crate::types::{ApiResponse, EmptyData, PurchaseLedgerEntry};
use crate::{query, AppState};
use axum::extract::{Path, State};
use axum::Json;

/// Purchases recorded for the user, oldest first
#[utoipa::path(
    get,
    path = "/users/{user_id}/purchases",
    params(("user_id" = String, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "Recorded purchases", body = ApiResponse<Vec<PurchaseLedgerEntry>>),
        (status = 404, description = "Unknown user", body = ApiResponse<EmptyData>)
    ),
    tag = "Subscriptions"
)]
pub async fn purchases(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<PurchaseLedgerEntry>>>, AppError> {
    let entries = app_state
        .with_connection(move |conn| query::purchases(conn, &user_id))
        .await?;

    Ok(Json(ApiResponse::ok(entries)))
}
