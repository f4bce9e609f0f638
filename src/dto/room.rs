use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{BattleRoomEntity, Difficulty, RoomStatus},
    dto::{
        common::PlayerSummary,
        format_epoch_ms,
        validation::{validate_not_blank, validate_question_ids},
    },
};

/// Payload used to open a new battle room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub host_id: String,
    #[validate(length(min = 1, max = 40))]
    pub host_name: String,
    #[validate(length(min = 1, max = 60), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(min = 1, max = 80), custom(function = "validate_not_blank"))]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Omit (or send an empty string) for a public room.
    #[serde(default)]
    #[validate(length(max = 64))]
    pub password: Option<String>,
    /// Clamped to `[2, 4]`; defaults to the configured seat count.
    #[serde(default)]
    pub max_players: Option<u8>,
}

/// Identifier of a freshly created room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
}

/// Request to take a seat in a room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
    #[validate(length(min = 1, max = 40))]
    pub display_name: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request to give up a seat.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
}

/// Outcome of a leave request.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomResponse {
    /// True when the room record was deleted.
    pub room_deleted: bool,
}

/// Ready toggle of a seated player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReadyRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
    pub ready: bool,
}

/// Host request to start the battle, either with explicit question ids or a count to generate.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartBattleRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub requested_by: String,
    #[serde(default)]
    #[validate(custom(function = "validate_question_ids"))]
    pub question_ids: Option<Vec<String>>,
    #[serde(default)]
    #[validate(range(min = 1, max = 50))]
    pub question_count: Option<usize>,
    #[serde(default)]
    #[validate(length(min = 2, max = 8))]
    pub language: Option<String>,
}

/// Request to be matched into any open public room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuickMatchRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
    #[validate(length(min = 1, max = 40))]
    pub display_name: String,
}

/// Public projection of a room. The password itself is never exposed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub host_id: String,
    pub name: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub is_public: bool,
    pub has_password: bool,
    pub max_players: u8,
    pub current_players: u8,
    pub players: Vec<PlayerSummary>,
    pub status: RoomStatus,
    pub questions: Vec<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl From<&BattleRoomEntity> for RoomSummary {
    fn from(room: &BattleRoomEntity) -> Self {
        Self {
            id: room.id.clone(),
            host_id: room.host_id.clone(),
            name: room.name.clone(),
            topic: room.topic.clone(),
            difficulty: room.difficulty,
            is_public: room.is_public,
            has_password: room.password.is_some(),
            max_players: room.max_players,
            current_players: room.current_players,
            players: room.players.iter().map(PlayerSummary::from).collect(),
            status: room.status,
            questions: room.questions.clone(),
            created_at: format_epoch_ms(room.created_at),
            started_at: room.started_at.map(format_epoch_ms),
        }
    }
}

impl From<BattleRoomEntity> for RoomSummary {
    fn from(room: BattleRoomEntity) -> Self {
        Self::from(&room)
    }
}
