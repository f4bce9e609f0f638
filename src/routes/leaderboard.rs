//! Leaderboard and badge endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::leaderboard::{
        BadgesResponse, EvaluateBadgesRequest, LeaderboardEntryDto, LeaderboardQuery,
        ResetLeaderboardResponse, UpdateLeaderboardRequest,
    },
    error::AppError,
    services::{badge_service, leaderboard_service},
    state::SharedState,
};

/// Leaderboard and badge routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/leaderboard", get(list))
        .route("/leaderboard/update", post(update))
        .route("/leaderboard/reset", post(reset))
        .route("/badges/evaluate", post(evaluate_badges))
}

/// Leaderboard, best first.
#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Ranked leaderboard", body = [LeaderboardEntryDto]))
)]
pub async fn list(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntryDto>>, AppError> {
    query.validate()?;
    Ok(Json(
        leaderboard_service::list_leaderboard(&state, query.limit).await?,
    ))
}

/// Add points to a leaderboard entry.
#[utoipa::path(
    post,
    path = "/api/leaderboard/update",
    tag = "leaderboard",
    request_body = UpdateLeaderboardRequest,
    responses((status = 200, description = "Updated entry", body = LeaderboardEntryDto))
)]
pub async fn update(
    State(state): State<SharedState>,
    Json(payload): Json<UpdateLeaderboardRequest>,
) -> Result<Json<LeaderboardEntryDto>, AppError> {
    payload.validate()?;
    Ok(Json(
        leaderboard_service::update_leaderboard(&state, payload).await?,
    ))
}

/// Clear every leaderboard entry.
#[utoipa::path(
    post,
    path = "/api/leaderboard/reset",
    tag = "leaderboard",
    responses((status = 200, description = "Leaderboard cleared", body = ResetLeaderboardResponse))
)]
pub async fn reset(
    State(state): State<SharedState>,
) -> Result<Json<ResetLeaderboardResponse>, AppError> {
    Ok(Json(leaderboard_service::reset_leaderboard(&state).await?))
}

/// Award badges earned by a player.
#[utoipa::path(
    post,
    path = "/api/badges/evaluate",
    tag = "leaderboard",
    request_body = EvaluateBadgesRequest,
    responses((status = 200, description = "Badges held by the player", body = BadgesResponse))
)]
pub async fn evaluate_badges(
    State(state): State<SharedState>,
    Json(payload): Json<EvaluateBadgesRequest>,
) -> Result<Json<BadgesResponse>, AppError> {
    payload.validate()?;
    Ok(Json(
        badge_service::evaluate_badges(&state, payload.uid.trim()).await?,
    ))
}
