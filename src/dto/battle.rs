use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{
        BattleResultEntity, Difficulty, MatchEntity, MatchOutcome, MatchResultEntity,
        PlayerAnswerEntity, RankChangeEntity,
    },
    dto::{common::CountdownDto, format_epoch_ms, validation::validate_not_blank},
    state::state_machine::MatchPhase,
};

/// Answer submitted by a participant for the current question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub question_id: String,
    #[validate(length(max = 500))]
    pub answer: String,
    /// Client-side verdict, only used when the question is unknown to the server.
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub time_taken_ms: u64,
}

/// Score after an accepted answer.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub is_correct: bool,
    pub score: u32,
    /// `running` while others still have to answer, `answered` once everyone did.
    pub phase: String,
}

/// Optional topic override for result evaluation.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 80))]
    pub topic: Option<String>,
}

/// Final verdict of a match.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchResultSummary {
    /// `null` on a draw.
    pub winner_id: Option<String>,
    pub scores: IndexMap<String, u32>,
    pub finished_at: String,
}

impl From<&MatchResultEntity> for MatchResultSummary {
    fn from(result: &MatchResultEntity) -> Self {
        Self {
            winner_id: result.winner_id.clone(),
            scores: result.scores.clone(),
            finished_at: format_epoch_ms(result.finished_at),
        }
    }
}

/// One recorded answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAnswerSummary {
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub submitted_at: u64,
}

impl From<&PlayerAnswerEntity> for PlayerAnswerSummary {
    fn from(answer: &PlayerAnswerEntity) -> Self {
        Self {
            question_id: answer.question_id.clone(),
            answer: answer.answer.clone(),
            is_correct: answer.is_correct,
            time_taken_ms: answer.time_taken_ms,
            submitted_at: answer.submitted_at,
        }
    }
}

/// Snapshot of a live or finished match.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub room_id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub participants: Vec<String>,
    pub bots: Vec<String>,
    pub questions: Vec<String>,
    pub scores: IndexMap<String, u32>,
    pub player_answers: IndexMap<String, Vec<PlayerAnswerSummary>>,
    pub current_question_index: usize,
    pub countdown: CountdownDto,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResultSummary>,
}

impl MatchSummary {
    /// Project a match node, stamping the countdown with the server clock at `now`.
    pub fn from_node(node: &MatchEntity, now: u64) -> Self {
        Self {
            room_id: node.room_id.clone(),
            topic: node.topic.clone(),
            difficulty: node.difficulty,
            participants: node.participants.clone(),
            bots: node.bots.clone(),
            questions: node.questions.clone(),
            scores: node.scores.clone(),
            player_answers: node
                .player_answers
                .iter()
                .map(|(uid, answers)| {
                    (
                        uid.clone(),
                        answers.iter().map(PlayerAnswerSummary::from).collect(),
                    )
                })
                .collect(),
            current_question_index: node.current_question_index,
            countdown: CountdownDto::stamped(&node.countdown, now),
            phase: MatchPhase::of(node).label().to_owned(),
            result: node.result.as_ref().map(MatchResultSummary::from),
        }
    }
}

/// Match position after an advance.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub phase: String,
    pub current_question_index: usize,
    pub countdown: CountdownDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResultSummary>,
}

/// Leaderboard credit of one participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankChangeSummary {
    pub uid: String,
    pub outcome: MatchOutcome,
    pub points_delta: u64,
    pub previous_points: u64,
    pub new_points: u64,
    pub previous_tier: String,
    pub new_tier: String,
    pub tier_changed: bool,
}

impl From<&RankChangeEntity> for RankChangeSummary {
    fn from(change: &RankChangeEntity) -> Self {
        Self {
            uid: change.uid.clone(),
            outcome: change.outcome,
            points_delta: change.points_delta,
            previous_points: change.previous_points,
            new_points: change.new_points,
            previous_tier: change.previous_tier.clone(),
            new_tier: change.new_tier.clone(),
            tier_changed: change.previous_tier != change.new_tier,
        }
    }
}

/// Evaluated outcome of a finished match.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResponse {
    pub room_id: String,
    pub topic: String,
    pub winner_id: Option<String>,
    pub scores: IndexMap<String, u32>,
    pub rank_changes: Vec<RankChangeSummary>,
}

/// Filter for archived battle results.
#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct BattleResultsQuery {
    /// Only results involving this player.
    pub uid: Option<String>,
}

/// Archived battle shown on history screens.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BattleResultSummary {
    pub id: String,
    pub room_id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub participants: Vec<String>,
    pub winner_id: Option<String>,
    pub scores: IndexMap<String, u32>,
    pub finished_at: String,
}

impl From<BattleResultEntity> for BattleResultSummary {
    fn from(result: BattleResultEntity) -> Self {
        Self {
            id: result.id,
            room_id: result.room_id,
            topic: result.topic,
            difficulty: result.difficulty,
            participants: result.participants,
            winner_id: result.winner_id,
            scores: result.scores,
            finished_at: format_epoch_ms(result.finished_at),
        }
    }
}
