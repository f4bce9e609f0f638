//! User profile endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::patch,
};
use serde_json::{Map, Value};

use crate::{
    dto::profile::ProfileUpdateResponse, error::AppError, services::profile_service,
    state::SharedState,
};

/// Profile routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/users/{uid}", patch(update_profile))
}

/// Merge fields into a user profile. Queued while storage is unavailable.
#[utoipa::path(
    patch,
    path = "/api/users/{uid}",
    tag = "users",
    params(("uid" = String, Path, description = "User identifier")),
    request_body(content = serde_json::Value, description = "Profile fields to merge"),
    responses(
        (status = 200, description = "Profile updated or queued", body = ProfileUpdateResponse),
        (status = 400, description = "Empty update")
    )
)]
pub async fn update_profile(
    State(state): State<SharedState>,
    Path(uid): Path<String>,
    Json(updates): Json<Map<String, Value>>,
) -> Result<Json<ProfileUpdateResponse>, AppError> {
    if uid.trim().is_empty() {
        return Err(AppError::BadRequest("uid must not be blank".into()));
    }
    Ok(Json(
        profile_service::update_profile(&state, &uid, updates).await?,
    ))
}
