//! Liveness report.

use tracing::warn;

use crate::{dto::health::HealthResponse, services::profile_service, state::SharedState};

/// Report the service status, probing the store when one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let reachable = match state.store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                false
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            false
        }
    };

    let pending = profile_service::pending_count(state).await;
    HealthResponse::new(!reachable || state.is_degraded(), pending)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::realtime_store::memory::MemoryRealtimeStore, state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        let store = Arc::new(MemoryRealtimeStore::new());
        state.install_store(store.clone()).await;
        assert_eq!(health_status(&state).await.status, "ok");

        store.set_offline(true);
        assert_eq!(health_status(&state).await.status, "degraded");
    }

    #[tokio::test]
    async fn reports_queued_profile_writes() {
        let state = AppState::new(AppConfig::default());
        let updates = serde_json::json!({"xp": 1}).as_object().cloned().unwrap();
        crate::services::profile_service::update_profile(&state, "ada", updates)
            .await
            .unwrap();

        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.pending_writes, 1);
    }
}
