//! Shared application state.

pub mod battle;
pub mod coordinator;
pub mod room;
mod room_lock;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    config::AppConfig,
    dao::realtime_store::RealtimeStore,
    error::ServiceError,
    services::{
        profile_service::PendingWrite,
        question_service::{self, QuestionGenerator},
    },
};

pub use self::coordinator::{GateGuard, MatchCoordinator};
pub use self::room_lock::RoomLock;
pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{room_lock::RoomGates, state_machine::MatchPhase};

/// State handle shared by every handler and task.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, per-match coordinators, timers and SSE hub.
pub struct AppState {
    store: RwLock<Option<Arc<dyn RealtimeStore>>>,
    config: Arc<AppConfig>,
    questions: Arc<dyn QuestionGenerator>,
    lobby: SseHub,
    coordinators: DashMap<String, Arc<MatchCoordinator>>,
    room_gates: RoomGates,
    bot_timers: DashMap<String, JoinHandle<()>>,
    pending_writes: Mutex<VecDeque<PendingWrite>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let questions = question_service::default_generator(&config);
        Self::with_generator(config, questions)
    }

    /// Same as [`AppState::new`] with an explicit question generator.
    pub fn with_generator(config: AppConfig, questions: Arc<dyn QuestionGenerator>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            lobby: SseHub::new(config.sse_capacity),
            config: Arc::new(config),
            questions,
            coordinators: DashMap::new(),
            room_gates: RoomGates::default(),
            bot_timers: DashMap::new(),
            pending_writes: Mutex::new(VecDeque::new()),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Generator used to create battle questions.
    pub fn question_generator(&self) -> Arc<dyn QuestionGenerator> {
        self.questions.clone()
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn RealtimeStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the current store or fail with [`ServiceError::Degraded`].
    pub async fn require_store(&self) -> Result<Arc<dyn RealtimeStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn RealtimeStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub used for the lobby SSE stream.
    pub fn lobby_sse(&self) -> &SseHub {
        &self.lobby
    }

    /// Coordinator of the match in `room_id`, created in `phase` when none exists yet.
    pub fn coordinator(
        &self,
        room_id: &str,
        phase: impl FnOnce() -> MatchPhase,
    ) -> Arc<MatchCoordinator> {
        self.coordinators
            .entry(room_id.to_owned())
            .or_insert_with(|| {
                Arc::new(MatchCoordinator::new(
                    room_id,
                    phase(),
                    Some(self.config.transition_timeout),
                ))
            })
            .clone()
    }

    /// Coordinator of `room_id` if one is registered.
    pub fn existing_coordinator(&self, room_id: &str) -> Option<Arc<MatchCoordinator>> {
        self.coordinators
            .get(room_id)
            .map(|entry| entry.value().clone())
    }

    /// Forget the coordinator of `room_id`, stopping its watchdog.
    pub fn drop_coordinator(&self, room_id: &str) {
        if let Some((_, coordinator)) = self.coordinators.remove(room_id) {
            coordinator.disarm_watchdog();
        }
    }

    /// Forget the coordinator of a finished match once no other caller holds it.
    ///
    /// The caller must have released the match gate.
    pub fn retire_coordinator(&self, coordinator: Arc<MatchCoordinator>) {
        let retired = self
            .coordinators
            .remove_if(coordinator.room_id(), |_, registered| {
                Arc::ptr_eq(registered, &coordinator) && Arc::strong_count(registered) == 2
            });
        if retired.is_some() {
            debug!(room_id = %coordinator.room_id(), "match coordinator retired");
        }
    }

    /// Serialize read-modify-write sequences on the room record `room_id`.
    pub async fn lock_room(&self, room_id: &str) -> RoomLock {
        RoomLock::acquire(&self.room_gates, room_id).await
    }

    /// Register the bot backfill timer of `room_id`, aborting any previous one.
    pub fn schedule_bot(&self, room_id: &str, timer: JoinHandle<()>) {
        if let Some(previous) = self.bot_timers.insert(room_id.to_owned(), timer) {
            previous.abort();
        }
    }

    /// Cancel the bot backfill timer of `room_id`. Returns whether one was pending.
    pub fn cancel_bot(&self, room_id: &str) -> bool {
        match self.bot_timers.remove(room_id) {
            Some((_, timer)) => {
                let pending = !timer.is_finished();
                timer.abort();
                pending
            }
            None => false,
        }
    }

    /// Forget a bot timer that already fired, without aborting the running task.
    pub fn release_bot(&self, room_id: &str) {
        self.bot_timers.remove(room_id);
    }

    /// Writes waiting for the store to come back.
    pub fn pending_writes(&self) -> &Mutex<VecDeque<PendingWrite>> {
        &self.pending_writes
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
