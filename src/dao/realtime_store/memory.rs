//! In-process realtime store used when no external backend is configured and in tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::dao::{
    models::{
        BattleResultEntity, BattleRoomEntity, LeaderboardEntryEntity, LeaderboardIncrement,
        MatchEntity, ProfileDocument, QuestionEntity, merge_profile,
    },
    realtime_store::{ChangeFeed, RealtimeStore, allocate_id},
    storage::{StorageError, StorageResult},
};

const FEED_CAPACITY: usize = 32;

/// Error surfaced when the in-process store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory store is offline")]
pub struct MemoryOffline;

/// Realtime store keeping every collection in concurrent maps.
#[derive(Clone)]
pub struct MemoryRealtimeStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    rooms: DashMap<String, BattleRoomEntity>,
    matches: DashMap<String, MatchEntity>,
    results: DashMap<String, BattleResultEntity>,
    questions: DashMap<String, QuestionEntity>,
    profiles: DashMap<String, ProfileDocument>,
    leaderboard: DashMap<String, LeaderboardEntryEntity>,
    room_feed: ChangeFeed<BattleRoomEntity>,
    match_feed: ChangeFeed<MatchEntity>,
    offline: AtomicBool,
}

impl Default for MemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRealtimeStore {
    /// Create an empty, online store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                rooms: DashMap::new(),
                matches: DashMap::new(),
                results: DashMap::new(),
                questions: DashMap::new(),
                profiles: DashMap::new(),
                leaderboard: DashMap::new(),
                room_feed: ChangeFeed::new(FEED_CAPACITY),
                match_feed: ChangeFeed::new(FEED_CAPACITY),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate a connectivity loss (`true`) or recovery (`false`).
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "in-memory store offline".into(),
                MemoryOffline,
            ))
        } else {
            Ok(())
        }
    }

    /// Run `op` against the inner maps once the store is confirmed online.
    fn run<T, F>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryInner) -> T + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(op(&store.inner))
        })
    }
}

impl RealtimeStore for MemoryRealtimeStore {
    fn create_room(
        &self,
        mut room: BattleRoomEntity,
    ) -> BoxFuture<'static, StorageResult<BattleRoomEntity>> {
        self.run(move |inner| {
            if room.id.is_empty() {
                room.id = allocate_id();
            }
            inner.rooms.insert(room.id.clone(), room.clone());
            inner.room_feed.publish(&room.id, Some(room.clone()));
            room
        })
    }

    fn find_room(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<BattleRoomEntity>>> {
        let id = id.to_owned();
        self.run(move |inner| inner.rooms.get(&id).map(|entry| entry.value().clone()))
    }

    fn save_room(&self, room: BattleRoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |inner| {
            let id = room.id.clone();
            inner.rooms.insert(id.clone(), room.clone());
            inner.room_feed.publish(&id, Some(room));
        })
    }

    fn delete_room(&self, id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let id = id.to_owned();
        self.run(move |inner| {
            let existed = inner.rooms.remove(&id).is_some();
            if existed {
                inner.room_feed.publish(&id, None);
            }
            existed
        })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<BattleRoomEntity>>> {
        self.run(|inner| {
            inner
                .rooms
                .iter()
                .map(|entry| entry.value().clone())
                .collect()
        })
    }

    fn find_match(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let room_id = room_id.to_owned();
        self.run(move |inner| {
            inner
                .matches
                .get(&room_id)
                .map(|entry| entry.value().clone())
        })
    }

    fn save_match(&self, node: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |inner| {
            let room_id = node.room_id.clone();
            inner.matches.insert(room_id.clone(), node.clone());
            inner.match_feed.publish(&room_id, Some(node));
        })
    }

    fn delete_match(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let room_id = room_id.to_owned();
        self.run(move |inner| {
            let existed = inner.matches.remove(&room_id).is_some();
            if existed {
                inner.match_feed.publish(&room_id, None);
            }
            existed
        })
    }

    fn save_battle_result(
        &self,
        mut result: BattleResultEntity,
    ) -> BoxFuture<'static, StorageResult<String>> {
        self.run(move |inner| {
            if result.id.is_empty() {
                result.id = allocate_id();
            }
            let id = result.id.clone();
            inner.results.insert(id.clone(), result);
            id
        })
    }

    fn list_battle_results(&self) -> BoxFuture<'static, StorageResult<Vec<BattleResultEntity>>> {
        self.run(|inner| {
            inner
                .results
                .iter()
                .map(|entry| entry.value().clone())
                .collect()
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |inner| {
            inner.questions.insert(question.id.clone(), question);
        })
    }

    fn find_question(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let id = id.to_owned();
        self.run(move |inner| inner.questions.get(&id).map(|entry| entry.value().clone()))
    }

    fn find_profile(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileDocument>>> {
        let uid = uid.to_owned();
        self.run(move |inner| inner.profiles.get(&uid).map(|entry| entry.value().clone()))
    }

    fn merge_profile(
        &self,
        uid: &str,
        updates: ProfileDocument,
    ) -> BoxFuture<'static, StorageResult<ProfileDocument>> {
        let uid = uid.to_owned();
        self.run(move |inner| {
            let mut entry = inner.profiles.entry(uid).or_default();
            merge_profile(entry.value_mut(), &updates);
            entry.value().clone()
        })
    }

    fn increment_leaderboard(
        &self,
        uid: &str,
        increment: LeaderboardIncrement,
    ) -> BoxFuture<'static, StorageResult<LeaderboardEntryEntity>> {
        let uid = uid.to_owned();
        self.run(move |inner| {
            let mut entry = inner
                .leaderboard
                .entry(uid.clone())
                .or_insert_with(|| LeaderboardEntryEntity::seeded(&uid, &Default::default()));
            entry.value_mut().apply(&increment);
            entry.value().clone()
        })
    }

    fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
        self.run(|inner| {
            inner
                .leaderboard
                .iter()
                .map(|entry| entry.value().clone())
                .collect()
        })
    }

    fn reset_leaderboard(&self) -> BoxFuture<'static, StorageResult<usize>> {
        self.run(|inner| {
            let cleared = inner.leaderboard.len();
            inner.leaderboard.clear();
            cleared
        })
    }

    fn watch_room(&self, id: &str) -> broadcast::Receiver<Option<BattleRoomEntity>> {
        self.inner.room_feed.subscribe(id)
    }

    fn watch_match(&self, room_id: &str) -> broadcast::Receiver<Option<MatchEntity>> {
        self.inner.match_feed.subscribe(room_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{Difficulty, RoomStatus};

    fn room() -> BattleRoomEntity {
        BattleRoomEntity {
            id: String::new(),
            host_id: "host".into(),
            name: "room".into(),
            topic: "history".into(),
            difficulty: Difficulty::Easy,
            password: None,
            is_public: true,
            max_players: 2,
            current_players: 0,
            players: vec![],
            status: RoomStatus::Waiting,
            questions: vec![],
            created_at: 0,
            started_at: None,
        }
    }

    #[tokio::test]
    async fn create_room_allocates_identifier() {
        let store = MemoryRealtimeStore::new();
        let created = store.create_room(room()).await.unwrap();

        assert!(!created.id.is_empty());
        let found = store.find_room(&created.id).await.unwrap();
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn deleting_a_room_notifies_watchers_with_none() {
        let store = MemoryRealtimeStore::new();
        let created = store.create_room(room()).await.unwrap();
        let mut rx = store.watch_room(&created.id);

        assert!(store.delete_room(&created.id).await.unwrap());
        assert_eq!(rx.recv().await.unwrap(), None);
        assert!(!store.delete_room(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn saving_a_room_publishes_the_stored_record() {
        let store = MemoryRealtimeStore::new();
        let mut created = store.create_room(room()).await.unwrap();
        let mut rx = store.watch_room(&created.id);

        created.current_players = 1;
        store.save_room(created.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Some(created.clone()));
        assert_eq!(store.find_room(&created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn offline_store_rejects_calls() {
        let store = MemoryRealtimeStore::new();
        store.set_offline(true);

        let err = store.list_rooms().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert!(store.health_check().await.is_err());

        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn leaderboard_increments_are_cumulative() {
        let store = MemoryRealtimeStore::new();
        let increment = LeaderboardIncrement {
            display_name: "Ada".into(),
            points: 10,
            wins: 1,
            battles: 1,
        };

        store
            .increment_leaderboard("ada", increment.clone())
            .await
            .unwrap();
        let entry = store.increment_leaderboard("ada", increment).await.unwrap();

        assert_eq!(entry.points, 20);
        assert_eq!(entry.wins, 2);
        assert_eq!(store.reset_leaderboard().await.unwrap(), 1);
        assert!(store.list_leaderboard().await.unwrap().is_empty());
    }
}
