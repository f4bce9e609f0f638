//! Server-sent event endpoints.

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/api/sse/lobby",
    tag = "sse",
    responses((status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream lobby events (room list changes, system status) to connected clients.
pub async fn lobby_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("new lobby SSE connection");
    sse_service::lobby_stream(&state)
}

#[utoipa::path(
    get,
    path = "/api/sse/rooms/{id}",
    tag = "sse",
    params(("id" = String, Path, description = "Room identifier")),
    responses((status = 200, description = "Room SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream snapshots of one room.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    info!(room_id = %id, "new room SSE connection");
    Ok(sse_service::room_stream(state, id).await?)
}

#[utoipa::path(
    get,
    path = "/api/sse/matches/{id}",
    tag = "sse",
    params(("id" = String, Path, description = "Room identifier of the match")),
    responses((status = 200, description = "Match SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream snapshots of one match.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    info!(room_id = %id, "new match SSE connection");
    Ok(sse_service::match_stream(state, id).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/lobby", get(lobby_stream))
        .route("/sse/rooms/{id}", get(room_stream))
        .route("/sse/matches/{id}", get(match_stream))
}
