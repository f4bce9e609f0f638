//! Records persisted by the realtime store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Difficulty requested for a room and its generated questions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Introductory questions.
    Easy,
    /// Default level.
    #[default]
    Medium,
    /// Questions for experienced players.
    Hard,
}

impl Difficulty {
    /// Stable lowercase label used in logs and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Lifecycle status of a battle room. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Open for players; the battle has not started.
    #[default]
    Waiting,
    /// Battle running.
    InProgress,
    /// Match finished and archived.
    Completed,
    /// Closed without a result.
    Cancelled,
}

impl RoomStatus {
    fn rank(self) -> u8 {
        match self {
            RoomStatus::Waiting => 0,
            RoomStatus::InProgress => 1,
            RoomStatus::Completed | RoomStatus::Cancelled => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only ordering.
    pub fn can_move_to(self, next: RoomStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Room document stored under `battle_rooms/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BattleRoomEntity {
    /// Store-assigned identifier. Empty until the store allocates one.
    pub id: String,
    /// Uid of the player who created the room.
    pub host_id: String,
    /// Display name of the room.
    pub name: String,
    /// Quiz topic used for question generation.
    pub topic: String,
    /// Difficulty of the generated questions.
    pub difficulty: Difficulty,
    /// Join password. Rooms with a password are private.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether the room is listed in the lobby (no password).
    pub is_public: bool,
    /// Seat limit, between 2 and 4.
    pub max_players: u8,
    /// Denormalised `players.len()`.
    pub current_players: u8,
    /// Seated players in join order, host first.
    pub players: Vec<BattlePlayerEntity>,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Question ids, written once when the battle starts.
    #[serde(default)]
    pub questions: Vec<String>,
    /// Creation time (epoch ms).
    pub created_at: u64,
    /// Battle start time (epoch ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

/// Player entry embedded in a room document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BattlePlayerEntity {
    /// Player identifier.
    pub uid: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Ready flag required before the host can start.
    pub is_ready: bool,
    /// Seat held by an AI opponent.
    #[serde(default)]
    pub is_bot: bool,
    /// Join time (epoch ms).
    pub joined_at: u64,
}

/// Countdown descriptor shared with clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountdownEntity {
    /// Full length of the countdown.
    pub duration_ms: u64,
    /// Server deadline (epoch ms).
    pub ends_at: u64,
    /// False once the countdown was stopped.
    pub running: bool,
    /// Server clock when the descriptor was produced, for skew correction.
    pub server_now: u64,
}

/// One submitted answer inside a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAnswerEntity {
    /// Question being answered.
    pub question_id: String,
    /// Chosen option; empty for a timeout.
    pub answer: String,
    /// Correctness used for scoring.
    pub is_correct: bool,
    /// Time the player needed.
    pub time_taken_ms: u64,
    /// Server receipt time (epoch ms).
    pub submitted_at: u64,
}

/// Terminal result of a match. `winner_id == None` means a draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResultEntity {
    /// Highest scorer, `None` on a tie at the top.
    pub winner_id: Option<String>,
    /// Final score per participant.
    pub scores: IndexMap<String, u32>,
    /// Finish time (epoch ms).
    pub finished_at: u64,
}

/// Live match record stored under `matches/{roomId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchEntity {
    /// Room the match belongs to; also the match key.
    pub room_id: String,
    /// Topic copied from the room.
    pub topic: String,
    /// Difficulty copied from the room.
    pub difficulty: Difficulty,
    /// Uids of every seated player at start.
    pub participants: Vec<String>,
    /// Participants played by the server.
    #[serde(default)]
    pub bots: Vec<String>,
    /// Display names captured from the room at start, keyed by uid.
    #[serde(default)]
    pub display_names: IndexMap<String, String>,
    /// Question ids in play order.
    pub questions: Vec<String>,
    /// Running score per participant.
    pub scores: IndexMap<String, u32>,
    /// Submitted answers per participant, in order.
    #[serde(default)]
    pub player_answers: IndexMap<String, Vec<PlayerAnswerEntity>>,
    /// Index of the open question.
    pub current_question_index: usize,
    /// Countdown of the open question.
    pub countdown: CountdownEntity,
    /// Set once the match finished; every later mutation is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResultEntity>,
    /// Whether the leaderboard was already credited.
    #[serde(default)]
    pub rank_applied: bool,
    /// Credits recorded by the first evaluation.
    #[serde(default)]
    pub rank_changes: Vec<RankChangeEntity>,
    /// Start time (epoch ms).
    pub started_at: u64,
}

/// How a participant fared in a finished match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Sole highest score.
    Win,
    /// Tied at the top.
    Draw,
    /// Anything else.
    Loss,
}

/// Leaderboard credit recorded when a match result is evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankChangeEntity {
    /// Credited player.
    pub uid: String,
    /// How the player fared.
    pub outcome: MatchOutcome,
    /// Points added.
    pub points_delta: u64,
    /// Points before the credit.
    pub previous_points: u64,
    /// Points after the credit.
    pub new_points: u64,
    /// Tier before the credit.
    pub previous_tier: String,
    /// Tier after the credit.
    pub new_tier: String,
}

/// Archived outcome stored under `battle_results/{id}` for history screens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BattleResultEntity {
    /// Archive identifier; the room id of the match.
    pub id: String,
    /// Room the battle was played in.
    pub room_id: String,
    /// Quiz topic.
    pub topic: String,
    /// Question difficulty.
    pub difficulty: Difficulty,
    /// Every participant uid.
    pub participants: Vec<String>,
    /// Winner, `None` for a draw.
    pub winner_id: Option<String>,
    /// Final scores.
    pub scores: IndexMap<String, u32>,
    /// Finish time (epoch ms).
    pub finished_at: u64,
}

/// Where a stored question came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    /// Produced by the question generator.
    Live,
    /// Built locally after the generator failed.
    Fallback,
}

/// Question document stored under `questions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEntity {
    /// Question identifier.
    pub id: String,
    /// Topic the question was generated for.
    pub topic: String,
    /// Requested difficulty.
    pub difficulty: Difficulty,
    /// Language code of the text.
    pub language: String,
    /// Question text.
    pub prompt: String,
    /// Answer options shown to players.
    pub options: Vec<String>,
    /// The correct option, verbatim.
    pub correct_answer: String,
    /// Cached explanation of the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Origin of the question.
    pub source: QuestionSource,
    /// Creation time (epoch ms).
    pub created_at: u64,
}

/// Leaderboard document stored under `leaderboard/{uid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryEntity {
    /// Player identifier.
    pub uid: String,
    /// Last known display name.
    pub display_name: String,
    /// Accumulated points.
    pub points: u64,
    /// Matches won.
    pub wins: u32,
    /// Matches credited.
    pub battles: u32,
}

/// Atomic increments applied to a leaderboard entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardIncrement {
    /// Name to record; empty keeps the current one.
    pub display_name: String,
    /// Points to add.
    pub points: u64,
    /// Wins to add.
    pub wins: u32,
    /// Battles to add.
    pub battles: u32,
}

impl LeaderboardEntryEntity {
    /// Apply an increment in place, creating nothing and never decreasing counters.
    pub fn apply(&mut self, increment: &LeaderboardIncrement) {
        if !increment.display_name.is_empty() {
            self.display_name = increment.display_name.clone();
        }
        self.points = self.points.saturating_add(increment.points);
        self.wins = self.wins.saturating_add(increment.wins);
        self.battles = self.battles.saturating_add(increment.battles);
    }

    /// Fresh entry seeded from a first increment.
    pub fn seeded(uid: &str, increment: &LeaderboardIncrement) -> Self {
        let mut entry = Self {
            uid: uid.to_owned(),
            display_name: uid.to_owned(),
            points: 0,
            wins: 0,
            battles: 0,
        };
        entry.apply(increment);
        entry
    }
}

/// Free-form profile document stored under `users/{uid}`.
pub type ProfileDocument = Map<String, Value>;

/// Merge `updates` into `profile`, later fields overwriting earlier ones.
pub fn merge_profile(profile: &mut ProfileDocument, updates: &ProfileDocument) {
    for (key, value) in updates {
        profile.insert(key.clone(), value.clone());
    }
}
