//! Match endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::battle::{
        AdvanceResponse, AnswerResponse, BattleResultSummary, BattleResultsQuery, EvaluateRequest,
        EvaluationResponse, MatchSummary, SubmitAnswerRequest,
    },
    error::AppError,
    services::match_service,
    state::SharedState,
};

/// Match progression routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/answers", post(submit_answer))
        .route("/matches/{id}/advance", post(advance))
        .route("/matches/{id}/timeout", post(timeout))
        .route("/matches/{id}/evaluate", post(evaluate))
        .route("/battle-results", get(battle_results))
}

/// Current state of a match.
#[utoipa::path(
    get,
    path = "/api/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Room identifier of the match")),
    responses(
        (status = 200, description = "Match snapshot", body = MatchSummary),
        (status = 404, description = "No match for this room")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::get_match(&state, &id).await?))
}

/// Submit an answer to the open question.
#[utoipa::path(
    post,
    path = "/api/matches/{id}/answers",
    tag = "matches",
    params(("id" = String, Path, description = "Room identifier of the match")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 400, description = "Not a participant"),
        (status = 409, description = "Match already finished")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    payload.validate()?;
    Ok(Json(match_service::submit_answer(&state, &id, payload).await?))
}

/// Open the next question or finish the match.
#[utoipa::path(
    post,
    path = "/api/matches/{id}/advance",
    tag = "matches",
    params(("id" = String, Path, description = "Room identifier of the match")),
    responses((status = 200, description = "Match advanced", body = AdvanceResponse))
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<AdvanceResponse>, AppError> {
    Ok(Json(match_service::advance_or_finish(&state, &id).await?))
}

/// Time the open question out: missing answers are recorded as wrong, then the match advances.
#[utoipa::path(
    post,
    path = "/api/matches/{id}/timeout",
    tag = "matches",
    params(("id" = String, Path, description = "Room identifier of the match")),
    responses((status = 200, description = "Question timed out", body = AdvanceResponse))
)]
pub async fn timeout(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<AdvanceResponse>, AppError> {
    Ok(Json(
        match_service::expire_current_question(&state, &id).await?,
    ))
}

/// Evaluate a finished match, crediting the leaderboard on the first call.
#[utoipa::path(
    post,
    path = "/api/matches/{id}/evaluate",
    tag = "matches",
    params(("id" = String, Path, description = "Room identifier of the match")),
    request_body(content = EvaluateRequest, description = "Optional topic override"),
    responses(
        (status = 200, description = "Evaluation", body = EvaluationResponse),
        (status = 409, description = "Match not finished")
    )
)]
pub async fn evaluate(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Option<Json<EvaluateRequest>>,
) -> Result<Json<EvaluationResponse>, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    payload.validate()?;
    Ok(Json(
        match_service::evaluate_results(&state, &id, payload.topic).await?,
    ))
}

/// Archived battles, newest first.
#[utoipa::path(
    get,
    path = "/api/battle-results",
    tag = "matches",
    params(BattleResultsQuery),
    responses((status = 200, description = "Archived results", body = [BattleResultSummary]))
)]
pub async fn battle_results(
    State(state): State<SharedState>,
    Query(query): Query<BattleResultsQuery>,
) -> Result<Json<Vec<BattleResultSummary>>, AppError> {
    Ok(Json(
        match_service::list_battle_results(&state, query.uid.as_deref()).await?,
    ))
}
