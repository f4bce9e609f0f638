//! Per-match serialization of phase transitions.

use std::{future::Future, sync::Mutex as StdMutex, time::Duration};

use tokio::{
    sync::{Mutex, MutexGuard, RwLock},
    task::JoinHandle,
    time::timeout,
};
use tracing::warn;

use crate::{
    error::ServiceError,
    state::state_machine::{
        AbortError, ApplyError, MatchEvent, MatchPhase, MatchStateMachine, Plan, PlanError,
        PlanId, Snapshot,
    },
};

/// Proof that the holder owns the mutation gate of a match.
pub type GateGuard<'a> = MutexGuard<'a, ()>;

/// Serializes every read-modify-write of one match record and tracks its phase.
///
/// Callers take the gate with [`MatchCoordinator::lock`], reload the node, mutate it and
/// persist it while holding the guard. Phase changes go through
/// [`MatchCoordinator::transition`], which plans the event, runs the persisting work and
/// applies or aborts the plan depending on the outcome.
pub struct MatchCoordinator {
    room_id: String,
    machine: RwLock<MatchStateMachine>,
    gate: Mutex<()>,
    watchdog: StdMutex<Option<JoinHandle<()>>>,
    transition_timeout: Option<Duration>,
}

impl MatchCoordinator {
    /// Coordinator for a match persisted in `phase`.
    pub fn new(room_id: &str, phase: MatchPhase, transition_timeout: Option<Duration>) -> Self {
        Self {
            room_id: room_id.to_owned(),
            machine: RwLock::new(MatchStateMachine::resume(phase)),
            gate: Mutex::new(()),
            watchdog: StdMutex::new(None),
            transition_timeout,
        }
    }

    /// Room the match belongs to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Wait for exclusive mutation rights on the match.
    pub async fn lock(&self) -> GateGuard<'_> {
        self.gate.lock().await
    }

    /// Current phase.
    pub async fn phase(&self) -> MatchPhase {
        self.machine.read().await.phase()
    }

    /// Phase, version and pending target.
    pub async fn snapshot(&self) -> Snapshot {
        self.machine.read().await.snapshot()
    }

    /// Run `work` as the side effect of `event`, keeping the phase unchanged when it fails.
    pub async fn transition<F, Fut, T>(
        &self,
        _gate: &GateGuard<'_>,
        event: MatchEvent,
        work: F,
    ) -> Result<(T, MatchPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = match self.transition_timeout {
            Some(limit) => match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    self.abort_logged(event, plan_id, "timeout").await;
                    return Err(ServiceError::Timeout);
                }
            },
            None => work_future.await,
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                Ok((value, next))
            }
            Err(err) => {
                self.abort_logged(event, plan_id, "work error").await;
                Err(err)
            }
        }
    }

    /// Replace the countdown watchdog, aborting the previous one.
    pub fn arm_watchdog(&self, handle: JoinHandle<()>) {
        let previous = match self.watchdog.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the countdown watchdog, if any.
    pub fn disarm_watchdog(&self) {
        let previous = match self.watchdog.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn plan_transition(&self, event: MatchEvent) -> Result<Plan, PlanError> {
        self.machine.write().await.plan(event)
    }

    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        self.machine.write().await.apply(plan_id)
    }

    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        self.machine.write().await.abort(plan_id)
    }

    async fn abort_logged(&self, event: MatchEvent, plan_id: PlanId, cause: &'static str) {
        if let Err(abort_err) = self.abort_transition(plan_id).await {
            warn!(
                room_id = %self.room_id,
                event = ?event,
                plan_id = %plan_id,
                cause,
                error = ?abort_err,
                "failed to abort match transition"
            );
        }
    }
}

impl Drop for MatchCoordinator {
    fn drop(&mut self) {
        self.disarm_watchdog();
    }
}
