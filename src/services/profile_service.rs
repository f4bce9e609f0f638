//! Profile updates with an in-memory queue of writes waiting for the store.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    dao::models::ProfileDocument,
    dto::profile::ProfileUpdateResponse,
    error::ServiceError,
    state::{SharedState, now_ms},
};

const PROFILE_UPDATE: &str = "profile_update";

/// Write deferred until the store is reachable again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    /// Always `profile_update`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Profile owner.
    pub uid: String,
    /// Fields to merge.
    pub updates: ProfileDocument,
    /// Queue time, epoch milliseconds.
    pub created_at: u64,
}

/// Merge `updates` into the profile of `uid`. When the store is unreachable the update
/// is queued and replayed on reconnect.
pub async fn update_profile(
    state: &SharedState,
    uid: &str,
    updates: ProfileDocument,
) -> Result<ProfileUpdateResponse, ServiceError> {
    if updates.is_empty() {
        return Err(ServiceError::InvalidInput("no profile field to update".into()));
    }

    let outcome = match state.store().await {
        Some(store) => store.merge_profile(uid, updates.clone()).await,
        None => {
            enqueue(state, uid, updates).await;
            return Ok(queued(uid));
        }
    };

    match outcome {
        Ok(profile) => Ok(ProfileUpdateResponse {
            uid: uid.to_owned(),
            queued: false,
            profile: Some(profile),
        }),
        Err(err) => {
            warn!(uid, error = %err, "profile update failed; queueing");
            enqueue(state, uid, updates).await;
            Ok(queued(uid))
        }
    }
}

fn queued(uid: &str) -> ProfileUpdateResponse {
    ProfileUpdateResponse {
        uid: uid.to_owned(),
        queued: true,
        profile: None,
    }
}

async fn enqueue(state: &SharedState, uid: &str, updates: ProfileDocument) {
    let mut queue = state.pending_writes().lock().await;
    queue.push_back(PendingWrite {
        kind: PROFILE_UPDATE.to_owned(),
        uid: uid.to_owned(),
        updates,
        created_at: now_ms(),
    });
    warn!(uid, pending = queue.len(), "profile update queued");
}

/// Replay queued writes in order. Stops at the first failure, keeping it and everything
/// after it queued. Returns how many writes were applied.
pub async fn flush_pending(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let mut queue = state.pending_writes().lock().await;
    let mut applied = 0;

    while let Some(write) = queue.front() {
        store
            .merge_profile(&write.uid, write.updates.clone())
            .await?;
        queue.pop_front();
        applied += 1;
    }

    if applied > 0 {
        info!(applied, "pending profile writes flushed");
    }
    Ok(applied)
}

/// Number of writes still waiting.
pub async fn pending_count(state: &SharedState) -> usize {
    state.pending_writes().lock().await.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::realtime_store::{RealtimeStore, memory::MemoryRealtimeStore},
        state::AppState,
    };

    fn doc(value: serde_json::Value) -> ProfileDocument {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn online_updates_are_merged() {
        let state = AppState::new(AppConfig::default());
        state
            .install_store(Arc::new(MemoryRealtimeStore::new()))
            .await;

        let response = update_profile(&state, "ada", doc(json!({"displayName": "Ada"})))
            .await
            .unwrap();
        assert!(!response.queued);
        assert_eq!(response.profile.unwrap()["displayName"], "Ada");
    }

    #[tokio::test]
    async fn offline_updates_are_queued_and_flushed_in_order() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryRealtimeStore::new());
        state.install_store(store.clone()).await;
        store.set_offline(true);

        update_profile(&state, "ada", doc(json!({"xp": 1, "title": "rookie"})))
            .await
            .unwrap();
        let second = update_profile(&state, "ada", doc(json!({"xp": 2})))
            .await
            .unwrap();
        assert!(second.queued);
        assert_eq!(pending_count(&state).await, 2);

        assert!(flush_pending(&state).await.is_err());
        assert_eq!(pending_count(&state).await, 2);

        store.set_offline(false);
        assert_eq!(flush_pending(&state).await.unwrap(), 2);
        assert_eq!(pending_count(&state).await, 0);

        let profile = store.find_profile("ada").await.unwrap().unwrap();
        assert_eq!(profile["xp"], 2);
        assert_eq!(profile["title"], "rookie");
    }

    #[tokio::test]
    async fn degraded_updates_are_queued() {
        let state = AppState::new(AppConfig::default());
        let response = update_profile(&state, "ada", doc(json!({"xp": 1})))
            .await
            .unwrap();
        assert!(response.queued);
    }

    #[tokio::test]
    async fn empty_updates_are_rejected() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            update_profile(&state, "ada", ProfileDocument::new()).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn pending_writes_serialize_with_a_type_tag() {
        let write = PendingWrite {
            kind: PROFILE_UPDATE.into(),
            uid: "ada".into(),
            updates: doc(json!({"xp": 1})),
            created_at: 5,
        };
        let value = serde_json::to_value(&write).unwrap();
        assert_eq!(value["type"], "profile_update");
        assert_eq!(value["createdAt"], 5);
    }
}
