//! Background connectivity watch of the realtime store.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{realtime_store::RealtimeStore, storage::StorageError},
    services::{profile_service, sse_events::broadcast_system_status},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, keep the shared state in degraded mode while it is
/// unavailable and replay queued profile writes whenever it comes back.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RealtimeStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                on_recovered(&state).await;
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded() {
                                info!("storage healthy again; leaving degraded mode");
                                set_degraded(&state, false);
                                on_recovered(&state).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(health_err) => {
                            warn!(error = %health_err, "storage health check failed");
                            if reconnect(&state, store.as_ref()).await {
                                set_degraded(&state, false);
                                on_recovered(&state).await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            }
                            warn!("exhausted storage reconnect attempts; staying in degraded mode");
                            state.clear_store().await;
                            broadcast_system_status(&state, true);
                            break;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Retry `try_reconnect` with exponential backoff. Enters degraded mode after the first
/// failure.
async fn reconnect(state: &SharedState, store: &dyn RealtimeStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(reconnect_err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %reconnect_err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    set_degraded(state, true);
                } else {
                    warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

fn set_degraded(state: &SharedState, degraded: bool) {
    if state.is_degraded() != degraded {
        state.update_degraded(degraded);
        broadcast_system_status(state, degraded);
    }
}

async fn on_recovered(state: &SharedState) {
    broadcast_system_status(state, false);
    match profile_service::flush_pending(state).await {
        Ok(_) => {}
        Err(err) => warn!(error = %err, "replaying pending profile writes failed"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::realtime_store::memory::MemoryRealtimeStore,
        services::profile_service::{pending_count, update_profile},
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn connecting_leaves_degraded_mode_and_flushes_queue() {
        let state = AppState::new(AppConfig::default());
        let updates = json!({"xp": 3}).as_object().cloned().unwrap();
        assert!(update_profile(&state, "ada", updates).await.unwrap().queued);

        let store = Arc::new(MemoryRealtimeStore::new());
        let connected = store.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store: Arc<dyn RealtimeStore> = connected.clone();
            async move { Ok(store) }
        }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());
        assert_eq!(pending_count(&state).await, 0);
        let profile = store.find_profile("ada").await.unwrap().unwrap();
        assert_eq!(profile["xp"], 3);

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_health_checks_enter_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryRealtimeStore::new());
        let connected = store.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store: Arc<dyn RealtimeStore> = connected.clone();
            async move { Ok(store) }
        }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());

        store.set_offline(true);
        tokio::time::sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded());

        store.set_offline(false);
        tokio::time::sleep(MAX_DELAY * 2).await;
        assert!(!state.is_degraded());

        supervisor.abort();
    }
}
