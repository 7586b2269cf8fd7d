use crate::error::AppError;
use crate::types::{ApiResponse, EmptyData, UserEntitlementResponse};
use crate::{query, AppState};
use axum::extract::{Path, State};
use axum::Json;

/// Premium flag recomputed from the user's subscription rows
#[utoipa::path(
    get,
    path = "/users/{user_id}/entitlement",
    params(("user_id" = String, Path, description = "Owning user id")),
    responses(
        (status = 200, description = "Derived premium entitlement", body = ApiResponse<UserEntitlementResponse>),
        (status = 404, description = "Unknown user", body = ApiResponse<EmptyData>)
    ),
    tag = "Subscriptions"
)]
pub async fn user_entitlement(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UserEntitlementResponse>>, AppError> {
    let entitlement = app_state
        .with_connection(move |conn| query::user_entitlement(conn, &user_id))
        .await?;

    Ok(Json(ApiResponse::ok(entitlement)))
}
