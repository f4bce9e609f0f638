//! Question endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use validator::Validate;

use crate::{
    dto::question::{ExplainRequest, ExplanationResponse, GenerateQuestionRequest, QuestionDto},
    error::AppError,
    services::question_service,
    state::SharedState,
};

/// Question generation routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/questions/generate", post(generate))
        .route("/questions/{id}/explain", post(explain))
}

/// Generate one question. Falls back to the built-in bank when the generator is down.
#[utoipa::path(
    post,
    path = "/api/questions/generate",
    tag = "questions",
    request_body = GenerateQuestionRequest,
    responses(
        (status = 200, description = "Generated question", body = QuestionDto),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn generate(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateQuestionRequest>,
) -> Result<Json<QuestionDto>, AppError> {
    payload.validate()?;
    Ok(Json(
        question_service::generate_for_request(&state, payload).await?,
    ))
}

/// Explain the answer to a question.
#[utoipa::path(
    post,
    path = "/api/questions/{id}/explain",
    tag = "questions",
    params(("id" = String, Path, description = "Question identifier")),
    request_body(content = ExplainRequest, description = "Answer the player picked"),
    responses(
        (status = 200, description = "Explanation", body = ExplanationResponse),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn explain(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Option<Json<ExplainRequest>>,
) -> Result<Json<ExplanationResponse>, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    payload.validate()?;
    Ok(Json(
        question_service::explain(&state, &id, payload.selected_answer).await?,
    ))
}
