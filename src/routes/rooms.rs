//! Room endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::room::{
        CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, LeaveRoomRequest,
        LeaveRoomResponse, QuickMatchRequest, ReadyRequest, RoomSummary, StartBattleRequest,
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Room lifecycle routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/quick-match", post(quick_match))
        .route("/rooms/{id}", get(get_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}/leave", post(leave_room))
        .route("/rooms/{id}/ready", post(set_ready))
        .route("/rooms/{id}/start", post(start_battle))
}

/// List public rooms still waiting for players.
#[utoipa::path(
    get,
    path = "/api/rooms",
    tag = "rooms",
    responses((status = 200, description = "Open rooms, oldest first", body = [RoomSummary]))
)]
pub async fn list_rooms(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    Ok(Json(room_service::list_open_rooms(&state).await?))
}

/// Open a room seeded with its host.
#[utoipa::path(
    post,
    path = "/api/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = CreateRoomResponse),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), AppError> {
    payload.validate()?;
    let created = room_service::create_room(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Join a random open public room.
#[utoipa::path(
    post,
    path = "/api/rooms/quick-match",
    tag = "rooms",
    request_body = QuickMatchRequest,
    responses(
        (status = 200, description = "Joined room", body = RoomSummary),
        (status = 404, description = "No open room")
    )
)]
pub async fn quick_match(
    State(state): State<SharedState>,
    Json(payload): Json<QuickMatchRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    payload.validate()?;
    Ok(Json(room_service::quick_match(&state, payload).await?))
}

/// Room details, including private rooms.
#[utoipa::path(
    get,
    path = "/api/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSummary),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    Ok(Json(room_service::get_room(&state, &id).await?))
}

/// Take a seat. Joining a room twice is a no-op.
#[utoipa::path(
    post,
    path = "/api/rooms/{id}/join",
    tag = "rooms",
    params(("id" = String, Path, description = "Room identifier")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Seated", body = RoomSummary),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown room"),
        (status = 409, description = "Room full or already started")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    payload.validate()?;
    Ok(Json(room_service::join_room(&state, &id, payload).await?))
}

/// Leave a room. The host leaving deletes it.
#[utoipa::path(
    post,
    path = "/api/rooms/{id}/leave",
    tag = "rooms",
    params(("id" = String, Path, description = "Room identifier")),
    request_body = LeaveRoomRequest,
    responses((status = 200, description = "Left", body = LeaveRoomResponse))
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<LeaveRoomRequest>,
) -> Result<Json<LeaveRoomResponse>, AppError> {
    payload.validate()?;
    Ok(Json(room_service::leave_room(&state, &id, &payload.uid).await?))
}

/// Toggle the caller's ready flag.
#[utoipa::path(
    post,
    path = "/api/rooms/{id}/ready",
    tag = "rooms",
    params(("id" = String, Path, description = "Room identifier")),
    request_body = ReadyRequest,
    responses(
        (status = 200, description = "Ready flag stored", body = RoomSummary),
        (status = 404, description = "Unknown room or player")
    )
)]
pub async fn set_ready(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ReadyRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    payload.validate()?;
    Ok(Json(
        room_service::set_player_ready(&state, &id, &payload.uid, payload.ready).await?,
    ))
}

/// Start the battle (host only, everyone ready).
#[utoipa::path(
    post,
    path = "/api/rooms/{id}/start",
    tag = "rooms",
    params(("id" = String, Path, description = "Room identifier")),
    request_body = StartBattleRequest,
    responses(
        (status = 200, description = "Battle started", body = RoomSummary),
        (status = 403, description = "Requester is not the host"),
        (status = 409, description = "Room cannot start yet")
    )
)]
pub async fn start_battle(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<StartBattleRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    payload.validate()?;
    Ok(Json(room_service::start_battle(&state, &id, payload).await?))
}
