//! Names and payloads of server-sent events.

use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{BattleRoomEntity, MatchResultEntity},
    dto::{
        room::RoomSummary,
        sse::{
            CountdownTickEvent, MatchFinishedEvent, MatchPhaseEvent, RoomDeletedEvent,
            RoomSnapshotEvent, ServerEvent, SystemStatus,
        },
    },
    state::{SharedState, state_machine::MatchPhase},
};

/// A room opened.
pub const EVENT_ROOM_CREATED: &str = "room.created";
/// A room changed.
pub const EVENT_ROOM_UPDATED: &str = "room.updated";
/// A room is gone.
pub const EVENT_ROOM_DELETED: &str = "room.deleted";
/// A match changed phase.
pub const EVENT_MATCH_PHASE: &str = "match.phase";
/// A match has a result.
pub const EVENT_MATCH_FINISHED: &str = "match.finished";
/// A question countdown ticked.
pub const EVENT_COUNTDOWN_TICK: &str = "countdown.tick";
/// Storage connectivity changed.
pub const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Announce a newly created room on the lobby stream.
pub fn broadcast_room_created(state: &SharedState, room: &BattleRoomEntity) {
    let payload = RoomSnapshotEvent {
        room_id: room.id.clone(),
        room: Some(RoomSummary::from(room)),
    };
    send_lobby_event(state, EVENT_ROOM_CREATED, &payload);
}

/// Announce a room change (players, readiness, status).
pub fn broadcast_room_updated(state: &SharedState, room: &BattleRoomEntity) {
    let payload = RoomSnapshotEvent {
        room_id: room.id.clone(),
        room: Some(RoomSummary::from(room)),
    };
    send_lobby_event(state, EVENT_ROOM_UPDATED, &payload);
}

/// Announce that a room was deleted.
pub fn broadcast_room_deleted(state: &SharedState, room_id: &str) {
    let payload = RoomDeletedEvent {
        room_id: room_id.to_owned(),
    };
    send_lobby_event(state, EVENT_ROOM_DELETED, &payload);
}

/// Broadcast a match phase change.
pub fn broadcast_match_phase(state: &SharedState, room_id: &str, phase: &MatchPhase) {
    let payload = MatchPhaseEvent {
        room_id: room_id.to_owned(),
        phase: phase.label().to_owned(),
        question_index: phase.question_index(),
    };
    send_lobby_event(state, EVENT_MATCH_PHASE, &payload);
}

/// Publish the final standings of a match.
pub fn broadcast_match_finished(state: &SharedState, room_id: &str, result: &MatchResultEntity) {
    let payload = MatchFinishedEvent {
        room_id: room_id.to_owned(),
        winner_id: result.winner_id.clone(),
        scores: result.scores.clone(),
    };
    send_lobby_event(state, EVENT_MATCH_FINISHED, &payload);
}

/// Broadcast the displayed countdown value of the open question.
pub fn broadcast_countdown_tick(
    state: &SharedState,
    room_id: &str,
    question_index: usize,
    remaining_seconds: u64,
) {
    let payload = CountdownTickEvent {
        room_id: room_id.to_owned(),
        question_index,
        remaining_seconds,
    };
    send_lobby_event(state, EVENT_COUNTDOWN_TICK, &payload);
}

/// Broadcast the degraded flag after the storage supervisor changed it.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_lobby_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_lobby_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            state.lobby_sse().broadcast(event);
        }
        Err(err) => warn!(event, error = %err, "failed to serialize lobby SSE payload"),
    }
}
