//! Room lifecycle: create, join, leave, ready, start and quick match.
//!
//! Every read-modify-write of a room record runs under the room gate. A failed rule check
//! returns before anything is written.

use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::{
    dao::models::BattleRoomEntity,
    dto::room::{
        CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, LeaveRoomResponse,
        QuickMatchRequest, RoomSummary, StartBattleRequest,
    },
    error::ServiceError,
    services::{
        bot, match_service, question_service,
        sse_events::{broadcast_room_created, broadcast_room_deleted, broadcast_room_updated},
    },
    state::{
        SharedState, now_ms,
        room::{JoinOutcome, LeaveOutcome, NewRoom},
    },
};

const DEFAULT_LANGUAGE: &str = "en";

fn room_not_found(room_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("room `{room_id}` not found"))
}

/// Open a waiting room seeded with its host and schedule bot backfill.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<CreateRoomResponse, ServiceError> {
    let store = state.require_store().await?;
    let params = NewRoom {
        name: request.name.trim().to_owned(),
        topic: request.topic.trim().to_owned(),
        difficulty: request.difficulty,
        password: request.password,
        max_players: state.config().clamp_max_players(request.max_players),
    };
    let room = BattleRoomEntity::open(params, &request.host_id, &request.host_name, now_ms());
    let room = store.create_room(room).await?;

    info!(
        room_id = %room.id,
        host_id = %room.host_id,
        max_players = room.max_players,
        public = room.is_public,
        "room created"
    );
    broadcast_room_created(state, &room);
    bot::schedule_backfill(state, &room.id);

    Ok(CreateRoomResponse { room_id: room.id })
}

/// Take a seat in `room_id`. Joining twice is a no-op.
pub async fn join_room(
    state: &SharedState,
    room_id: &str,
    request: JoinRoomRequest,
) -> Result<RoomSummary, ServiceError> {
    let store = state.require_store().await?;
    let _guard = state.lock_room(room_id).await;

    let mut room = store
        .find_room(room_id)
        .await?
        .ok_or_else(|| room_not_found(room_id))?;
    let outcome = room.join(
        &request.uid,
        &request.display_name,
        request.password.as_deref(),
        now_ms(),
    )?;

    if outcome == JoinOutcome::Joined {
        store.save_room(room.clone()).await?;
        info!(room_id, uid = %request.uid, players = room.current_players, "player joined");
        broadcast_room_updated(state, &room);
    } else {
        debug!(room_id, uid = %request.uid, "player already seated");
    }
    Ok(RoomSummary::from(room))
}

/// Give up a seat. The host leaving, or the last player leaving, deletes the room
/// together with its match, even mid-battle.
pub async fn leave_room(
    state: &SharedState,
    room_id: &str,
    uid: &str,
) -> Result<LeaveRoomResponse, ServiceError> {
    let store = state.require_store().await?;
    let guard = state.lock_room(room_id).await;

    let Some(mut room) = store.find_room(room_id).await? else {
        return Err(room_not_found(room_id));
    };

    let room_deleted = match room.leave(uid) {
        LeaveOutcome::NotMember => {
            debug!(room_id, uid, "leave ignored: not a member");
            false
        }
        LeaveOutcome::Left => {
            store.save_room(room.clone()).await?;
            info!(room_id, uid, players = room.current_players, "player left");
            broadcast_room_updated(state, &room);
            false
        }
        LeaveOutcome::Dissolved => {
            store.delete_room(room_id).await?;
            state.cancel_bot(room_id);
            info!(room_id, uid, "room deleted");
            broadcast_room_deleted(state, room_id);
            true
        }
    };

    drop(guard);
    if room_deleted {
        match_service::discard_match(state, room_id).await?;
    }
    Ok(LeaveRoomResponse { room_deleted })
}

/// Set the ready flag of `uid`. Idempotent and allowed in any room status.
pub async fn set_player_ready(
    state: &SharedState,
    room_id: &str,
    uid: &str,
    ready: bool,
) -> Result<RoomSummary, ServiceError> {
    let store = state.require_store().await?;
    let _guard = state.lock_room(room_id).await;

    let mut room = store
        .find_room(room_id)
        .await?
        .ok_or_else(|| room_not_found(room_id))?;
    room.set_ready(uid, ready)?;
    store.save_room(room.clone()).await?;
    debug!(room_id, uid, ready, "ready flag updated");
    broadcast_room_updated(state, &room);

    Ok(RoomSummary::from(room))
}

/// Start the battle: the host asks, everyone is ready, questions are fixed once.
///
/// Without explicit ids, questions are generated for the room topic.
pub async fn start_battle(
    state: &SharedState,
    room_id: &str,
    request: StartBattleRequest,
) -> Result<RoomSummary, ServiceError> {
    let store = state.require_store().await?;
    let room = store
        .find_room(room_id)
        .await?
        .ok_or_else(|| room_not_found(room_id))?;
    room.ensure_startable(&request.requested_by)?;

    // generation may be slow; the room stays unlocked meanwhile and is re-checked below
    let questions = match request.question_ids {
        Some(ids) => ids,
        None => {
            let count = request
                .question_count
                .unwrap_or(state.config().default_question_count);
            question_service::generate_batch(
                state,
                &room.topic,
                room.difficulty,
                request.language.as_deref().unwrap_or(DEFAULT_LANGUAGE),
                count,
            )
            .await?
        }
    };

    let room = {
        let _guard = state.lock_room(room_id).await;
        let mut room = store
            .find_room(room_id)
            .await?
            .ok_or_else(|| room_not_found(room_id))?;
        room.begin(&request.requested_by, questions, now_ms())?;
        store.save_room(room.clone()).await?;
        state.cancel_bot(room_id);
        room
    };

    info!(room_id, questions = room.questions.len(), "battle starting");
    broadcast_room_updated(state, &room);
    match_service::init_match(state, &room).await?;

    Ok(RoomSummary::from(room))
}

/// Join a random open public room.
pub async fn quick_match(
    state: &SharedState,
    request: QuickMatchRequest,
) -> Result<RoomSummary, ServiceError> {
    let store = state.require_store().await?;
    let rooms = store.list_rooms().await?;
    let candidates: Vec<&BattleRoomEntity> = rooms
        .iter()
        .filter(|room| room.is_open() && !room.is_member(&request.uid))
        .collect();

    let room_id = candidates
        .choose(&mut rand::rng())
        .map(|room| room.id.clone())
        .ok_or_else(|| ServiceError::NotFound("no open room available".into()))?;
    debug!(room_id, uid = %request.uid, "quick match picked a room");

    join_room(
        state,
        &room_id,
        JoinRoomRequest {
            uid: request.uid,
            display_name: request.display_name,
            password: None,
        },
    )
    .await
}

/// Public rooms still waiting for players, oldest first.
pub async fn list_open_rooms(state: &SharedState) -> Result<Vec<RoomSummary>, ServiceError> {
    let store = state.require_store().await?;
    let mut rooms = store.list_rooms().await?;
    rooms.retain(BattleRoomEntity::is_open);
    rooms.sort_by_key(|room| room.created_at);
    Ok(rooms.into_iter().map(RoomSummary::from).collect())
}

/// Summary of one room.
pub async fn get_room(state: &SharedState, room_id: &str) -> Result<RoomSummary, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_room(room_id)
        .await?
        .map(RoomSummary::from)
        .ok_or_else(|| room_not_found(room_id))
}
