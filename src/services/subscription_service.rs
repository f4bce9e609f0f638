//! In-process subscriptions to room and match records.
//!
//! A subscription delivers the current snapshot first, then every change published on the
//! store's change feed. Absent records are delivered as `None`.

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{BattleRoomEntity, MatchEntity},
        realtime_store::RealtimeStore,
    },
    error::ServiceError,
    state::SharedState,
};

/// Live subscription. Delivery stops on [`Subscription::unsubscribe`] or drop.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery now.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Watch the room `room_id`, repairing `currentPlayers` when it disagrees with the
/// player list.
pub async fn subscribe_to_room<F>(
    state: &SharedState,
    room_id: &str,
    mut callback: F,
) -> Result<Subscription, ServiceError>
where
    F: FnMut(Option<BattleRoomEntity>) + Send + 'static,
{
    let store = state.require_store().await?;
    let mut receiver = store.watch_room(room_id);
    let current = store.find_room(room_id).await?;

    let state = state.clone();
    let room_id = room_id.to_owned();
    let handle = tokio::spawn(async move {
        let mut snapshot = Some(current);
        loop {
            let room = match snapshot.take() {
                Some(room) => room,
                None => match next_change(&mut receiver, &room_id).await {
                    Change::Record(room) => room,
                    Change::Resync => match store.find_room(&room_id).await {
                        Ok(room) => room,
                        Err(err) => {
                            warn!(room_id, error = %err, "room resync failed");
                            continue;
                        }
                    },
                    Change::Closed => break,
                },
            };

            let room = match room {
                Some(room) if needs_repair(&room) => {
                    repair_player_count(&state, store.as_ref(), &room_id)
                        .await
                        .unwrap_or_else(|err| {
                            warn!(room_id, error = %err, "player count repair failed");
                            Some(room)
                        })
                }
                other => other,
            };
            callback(room);
        }
        debug!(room_id, "room subscription ended");
    });

    Ok(Subscription { handle })
}

/// Watch the match node of `room_id`.
pub async fn subscribe_to_match<F>(
    state: &SharedState,
    room_id: &str,
    mut callback: F,
) -> Result<Subscription, ServiceError>
where
    F: FnMut(Option<MatchEntity>) + Send + 'static,
{
    let store = state.require_store().await?;
    let mut receiver = store.watch_match(room_id);
    let current = store.find_match(room_id).await?;

    let room_id = room_id.to_owned();
    let handle = tokio::spawn(async move {
        callback(current);
        loop {
            match next_change(&mut receiver, &room_id).await {
                Change::Record(node) => callback(node),
                Change::Resync => match store.find_match(&room_id).await {
                    Ok(node) => callback(node),
                    Err(err) => warn!(room_id, error = %err, "match resync failed"),
                },
                Change::Closed => break,
            }
        }
        debug!(room_id, "match subscription ended");
    });

    Ok(Subscription { handle })
}

enum Change<T> {
    Record(Option<T>),
    /// Changes were dropped; the record must be re-read.
    Resync,
    Closed,
}

async fn next_change<T: Clone>(
    receiver: &mut broadcast::Receiver<Option<T>>,
    room_id: &str,
) -> Change<T> {
    match receiver.recv().await {
        Ok(record) => Change::Record(record),
        Err(RecvError::Lagged(skipped)) => {
            debug!(room_id, skipped, "subscription lagged; resyncing");
            Change::Resync
        }
        Err(RecvError::Closed) => Change::Closed,
    }
}

fn needs_repair(room: &BattleRoomEntity) -> bool {
    usize::from(room.current_players) != room.players.len()
}

/// Rewrite `currentPlayers` of `room_id` from its player list under the room gate.
pub async fn repair_player_count(
    state: &SharedState,
    store: &dyn RealtimeStore,
    room_id: &str,
) -> Result<Option<BattleRoomEntity>, ServiceError> {
    let _guard = state.lock_room(room_id).await;

    let Some(mut room) = store.find_room(room_id).await? else {
        return Ok(None);
    };
    if room.sync_player_count() {
        store.save_room(room.clone()).await?;
        info!(
            room_id,
            current_players = room.current_players,
            "repaired room player count"
        );
    }
    Ok(Some(room))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::Difficulty, realtime_store::memory::MemoryRealtimeStore},
        state::{AppState, room::NewRoom},
    };

    async fn state() -> (SharedState, Arc<MemoryRealtimeStore>) {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryRealtimeStore::new());
        state.install_store(store.clone()).await;
        (state, store)
    }

    fn new_room() -> BattleRoomEntity {
        BattleRoomEntity::open(
            NewRoom {
                name: "room".into(),
                topic: "science".into(),
                difficulty: Difficulty::Easy,
                password: None,
                max_players: 2,
            },
            "host",
            "Host",
            1,
        )
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no delivery")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn absent_room_is_delivered_as_none() {
        let (state, _store) = state().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = subscribe_to_room(&state, "missing", move |room| {
            let _ = tx.send(room);
        })
        .await
        .unwrap();

        assert_eq!(recv(&mut rx).await, None);
    }

    #[tokio::test]
    async fn room_changes_are_delivered_in_order() {
        let (state, store) = state().await;
        let room = store.create_room(new_room()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = subscribe_to_room(&state, &room.id, move |room| {
            let _ = tx.send(room);
        })
        .await
        .unwrap();

        assert_eq!(recv(&mut rx).await.unwrap().players.len(), 1);

        store.delete_room(&room.id).await.unwrap();
        assert_eq!(recv(&mut rx).await, None);
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn mismatched_player_count_is_repaired() {
        let (state, store) = state().await;
        let mut room = store.create_room(new_room()).await.unwrap();
        room.current_players = 3;
        store.save_room(room.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = subscribe_to_room(&state, &room.id, move |room| {
            let _ = tx.send(room);
        })
        .await
        .unwrap();

        let delivered = recv(&mut rx).await.unwrap();
        assert_eq!(delivered.current_players, 1);
        let stored = store.find_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.current_players, 1);
    }

    #[tokio::test]
    async fn dropped_subscription_stops_delivery() {
        let (state, store) = state().await;
        let room = store.create_room(new_room()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = subscribe_to_match(&state, &room.id, move |node| {
            let _ = tx.send(node);
        })
        .await
        .unwrap();
        assert_eq!(recv(&mut rx).await, None);

        drop(subscription);
        tokio::task::yield_now().await;
        assert!(rx.recv().await.is_none());
    }
}
