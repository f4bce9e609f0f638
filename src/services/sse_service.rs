//! SSE streams for the lobby, a room or a match.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dao::models::{BattleRoomEntity, MatchEntity},
    dto::{
        battle::MatchSummary,
        room::RoomSummary,
        sse::{Handshake, MatchSnapshotEvent, RoomSnapshotEvent, ServerEvent},
    },
    error::ServiceError,
    services::subscription_service::{Subscription, subscribe_to_match, subscribe_to_room},
    state::{SharedState, now_ms},
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_ROOM_SNAPSHOT: &str = "room.snapshot";
const EVENT_MATCH_SNAPSHOT: &str = "match.snapshot";

/// Identifies the stream being served, for teardown logging.
#[derive(Clone, Debug)]
pub enum StreamKind {
    /// `/api/sse/lobby`.
    Lobby,
    /// Stream of one room.
    Room(String),
    /// Stream of one match.
    Match(String),
}

impl StreamKind {
    fn name(&self) -> &'static str {
        match self {
            StreamKind::Lobby => "lobby",
            StreamKind::Room(_) => "room",
            StreamKind::Match(_) => "match",
        }
    }
}

/// Lobby stream: handshake, then every lobby broadcast.
pub fn lobby_stream(
    state: &SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let receiver = state.lobby_sse().subscribe();
    let initial = handshake(state, &StreamKind::Lobby).into_iter().collect();
    to_sse_stream(initial, receiver, Some, StreamKind::Lobby)
}

/// Room stream: handshake and current snapshot, then one snapshot per change
/// (`room: null` once the room is gone). Snapshots come from a room subscription, so
/// a stale `currentPlayers` is repaired before it is sent.
pub async fn room_stream(
    state: SharedState,
    room_id: String,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let owned_id = room_id.clone();
    let subscription = subscribe_to_room(&state, &room_id, move |room| {
        if let Some(event) = room_snapshot(&owned_id, room) {
            let _ = tx.send(event);
        }
    })
    .await?;

    let kind = StreamKind::Room(room_id);
    let initial = handshake(&state, &kind).into_iter().collect();
    Ok(subscription_to_sse(initial, rx, subscription, kind))
}

/// Match stream: handshake and current snapshot, then one snapshot per change
/// (`match: null` when no match exists).
pub async fn match_stream(
    state: SharedState,
    room_id: String,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let owned_id = room_id.clone();
    let subscription = subscribe_to_match(&state, &room_id, move |node| {
        if let Some(event) = match_snapshot(&owned_id, node) {
            let _ = tx.send(event);
        }
    })
    .await?;

    let kind = StreamKind::Match(room_id);
    let initial = handshake(&state, &kind).into_iter().collect();
    Ok(subscription_to_sse(initial, rx, subscription, kind))
}

fn handshake(state: &SharedState, kind: &StreamKind) -> Option<ServerEvent> {
    let payload = Handshake {
        stream: kind.name().to_owned(),
        message: format!("connected to the {} stream", kind.name()),
        degraded: state.is_degraded(),
    };
    render(EVENT_HANDSHAKE, &payload)
}

fn room_snapshot(room_id: &str, room: Option<BattleRoomEntity>) -> Option<ServerEvent> {
    let payload = RoomSnapshotEvent {
        room_id: room_id.to_owned(),
        room: room.map(RoomSummary::from),
    };
    render(EVENT_ROOM_SNAPSHOT, &payload)
}

fn match_snapshot(room_id: &str, node: Option<MatchEntity>) -> Option<ServerEvent> {
    let now = now_ms();
    let payload = MatchSnapshotEvent {
        room_id: room_id.to_owned(),
        node: node.map(|node| MatchSummary::from_node(&node, now)),
    };
    render(EVENT_MATCH_SNAPSHOT, &payload)
}

fn render(event: &str, payload: &impl serde::Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response: `initial` events go out first,
/// then each received item rendered through `render`. Stops once the client disconnects.
pub fn to_sse_stream<T, F>(
    initial: Vec<ServerEvent>,
    mut receiver: broadcast::Receiver<T>,
    render: F,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<T, F>>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Option<ServerEvent> + Send + 'static,
{
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(item) => {
                            let Some(payload) = render(item) else { continue };
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(stream = kind.name(), skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        log_disconnect(&kind);
    });

    sse_response(rx)
}

/// Same as [`to_sse_stream`] for events produced by a store subscription. The
/// subscription lives as long as the client stays connected.
fn subscription_to_sse(
    initial: Vec<ServerEvent>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    subscription: Subscription,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = events.recv() => {
                    let Some(payload) = next else { break };
                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
            }
        }

        subscription.unsubscribe();
        log_disconnect(&kind);
    });

    sse_response(rx)
}

fn sse_response(
    rx: mpsc::Receiver<Result<Event, Infallible>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn log_disconnect(kind: &StreamKind) {
    match kind {
        StreamKind::Lobby => info!("Lobby SSE stream disconnected"),
        StreamKind::Room(room_id) => info!(room_id, "Room SSE stream disconnected"),
        StreamKind::Match(room_id) => info!(room_id, "Match SSE stream disconnected"),
    }
}
