use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::{battle::MatchSummary, room::RoomSummary};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event carrying a pre-rendered payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the stream (`lobby`, `room` or `match`).
    pub stream: String,
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Room snapshot pushed on room streams; `room` is `null` once the room is gone.
pub struct RoomSnapshotEvent {
    pub room_id: String,
    pub room: Option<RoomSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Match snapshot pushed on match streams; `match` is `null` when no match exists.
pub struct MatchSnapshotEvent {
    pub room_id: String,
    #[serde(rename = "match")]
    pub node: Option<MatchSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Lobby notification that a room disappeared.
pub struct RoomDeletedEvent {
    pub room_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Lobby notification of a match phase change.
pub struct MatchPhaseEvent {
    pub room_id: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Lobby notification that a match produced its result.
pub struct MatchFinishedEvent {
    pub room_id: String,
    pub winner_id: Option<String>,
    pub scores: IndexMap<String, u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Displayed countdown value of the open question, emitted when it changes.
pub struct CountdownTickEvent {
    pub room_id: String,
    pub question_index: usize,
    pub remaining_seconds: u64,
}
