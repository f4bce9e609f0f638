use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{Difficulty, QuestionEntity, QuestionSource},
    dto::validation::validate_not_blank,
};

/// Which screen the question is generated for; decides the answer time.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    #[default]
    Solo,
    Battle,
}

/// Request for one freshly generated question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuestionRequest {
    #[validate(length(min = 1, max = 80), custom(function = "validate_not_blank"))]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_language")]
    #[validate(length(min = 2, max = 8))]
    pub language: String,
    #[serde(default)]
    pub mode: QuizMode,
}

fn default_language() -> String {
    "en".into()
}

/// Question as shown to players.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub language: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub source: QuestionSource,
    /// Answer time granted for the requested mode.
    pub duration_ms: u64,
}

impl QuestionDto {
    pub fn from_entity(question: QuestionEntity, duration_ms: u64) -> Self {
        Self {
            id: question.id,
            topic: question.topic,
            difficulty: question.difficulty,
            language: question.language,
            prompt: question.prompt,
            options: question.options,
            correct_answer: question.correct_answer,
            explanation: question.explanation,
            source: question.source,
            duration_ms,
        }
    }
}

/// Optional context for an explanation request.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    /// Answer the player picked, echoed in the explanation when wrong.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub selected_answer: Option<String>,
}

/// Explanation of a stored question.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationResponse {
    pub question_id: String,
    pub correct_answer: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_correct: Option<bool>,
}
