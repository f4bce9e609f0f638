//! The `RealtimeStore` abstraction and its backends.

#[cfg(feature = "couch-store")]
pub mod couchdb;
mod feed;
pub mod memory;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::dao::models::{
    BattleResultEntity, BattleRoomEntity, LeaderboardEntryEntity, LeaderboardIncrement,
    MatchEntity, ProfileDocument, QuestionEntity,
};
use crate::dao::storage::StorageResult;

pub use feed::ChangeFeed;

/// Abstraction over the hosted realtime/document store backing rooms, matches and
/// the pass-through collections.
///
/// Every write goes through the implementation, which publishes the new record on
/// the matching change feed so subscribers observe it. Deletions publish `None`.
pub trait RealtimeStore: Send + Sync {
    /// Persist a new room, allocating its identifier. Returns the stored record.
    fn create_room(&self, room: BattleRoomEntity)
    -> BoxFuture<'static, StorageResult<BattleRoomEntity>>;
    /// Load a room by identifier.
    fn find_room(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<BattleRoomEntity>>>;
    /// Overwrite the full room record (last write wins).
    fn save_room(&self, room: BattleRoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a room, returning whether it existed.
    fn delete_room(&self, id: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Every stored room.
    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<BattleRoomEntity>>>;

    /// Load the match of a room.
    fn find_match(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Overwrite the match record.
    fn save_match(&self, node: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the match of a room, returning whether it existed.
    fn delete_match(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>>;

    /// Archive a finished battle, allocating its identifier when empty.
    fn save_battle_result(
        &self,
        result: BattleResultEntity,
    ) -> BoxFuture<'static, StorageResult<String>>;
    /// Every archived battle.
    fn list_battle_results(&self) -> BoxFuture<'static, StorageResult<Vec<BattleResultEntity>>>;

    /// Store a generated question.
    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a question by identifier.
    fn find_question(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;

    /// Load a user profile.
    fn find_profile(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileDocument>>>;
    /// Merge fields into a profile document, creating it when missing.
    fn merge_profile(
        &self,
        uid: &str,
        updates: ProfileDocument,
    ) -> BoxFuture<'static, StorageResult<ProfileDocument>>;

    /// Atomically add to a leaderboard entry, creating it when missing.
    fn increment_leaderboard(
        &self,
        uid: &str,
        increment: LeaderboardIncrement,
    ) -> BoxFuture<'static, StorageResult<LeaderboardEntryEntity>>;
    /// Every leaderboard entry, unordered.
    fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>>;
    /// Remove every leaderboard entry, returning how many were cleared.
    fn reset_leaderboard(&self) -> BoxFuture<'static, StorageResult<usize>>;

    /// Subscribe to changes of a room record.
    fn watch_room(&self, id: &str) -> broadcast::Receiver<Option<BattleRoomEntity>>;
    /// Subscribe to changes of a match record.
    fn watch_match(&self, room_id: &str) -> broadcast::Receiver<Option<MatchEntity>>;

    /// Cheap round-trip proving the store answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Allocate an opaque store identifier.
pub fn allocate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
