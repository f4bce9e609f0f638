//! Two-phase match state machine: plan, apply or abort.

use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::MatchEntity;

/// Progression of a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// The match node has not been written yet.
    NotStarted,
    /// Question `i` is open for answers and its countdown is running.
    Running(usize),
    /// Every participant answered question `i`; waiting for the advance.
    Answered(usize),
    /// A result has been recorded; every further mutation is rejected.
    Finished,
}

impl MatchPhase {
    /// Derive the phase a persisted match node is in.
    pub fn of(node: &MatchEntity) -> Self {
        if node.result.is_some() {
            MatchPhase::Finished
        } else if node.everyone_answered() {
            MatchPhase::Answered(node.current_question_index)
        } else {
            MatchPhase::Running(node.current_question_index)
        }
    }

    /// Index of the question currently on screen, if any.
    pub fn question_index(&self) -> Option<usize> {
        match self {
            MatchPhase::Running(index) | MatchPhase::Answered(index) => Some(*index),
            _ => None,
        }
    }

    /// Stable label used in logs and SSE payloads.
    pub fn label(&self) -> &'static str {
        match self {
            MatchPhase::NotStarted => "not_started",
            MatchPhase::Running(_) => "running",
            MatchPhase::Answered(_) => "answered",
            MatchPhase::Finished => "finished",
        }
    }
}

/// Events that can be applied to a match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// The host started the battle; the first question opens.
    Start,
    /// The last outstanding participant answered the current question.
    AllAnswered,
    /// Move on to the next question (manually or because the countdown expired).
    NextQuestion,
    /// The last question is over; the result is recorded.
    Finish,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: MatchPhase,
    /// The event that cannot be applied from this phase.
    pub event: MatchEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Pending plan.
        expected: PlanId,
        /// Plan passed by the caller.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase the plan started from.
        expected: MatchPhase,
        /// Phase found at apply time.
        actual: MatchPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version the plan started from.
        expected: usize,
        /// Version found at apply time.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Pending plan.
        expected: PlanId,
        /// Plan passed by the caller.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Phase when planned.
    pub from: MatchPhase,
    /// Phase after apply.
    pub to: MatchPhase,
    /// Event being applied.
    pub event: MatchEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// When the plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: MatchPhase,
    /// Increments on each applied transition.
    pub version: usize,
    /// Target phase of a planned but not yet applied transition.
    pub pending: Option<MatchPhase>,
}

/// Plan/apply/abort state machine tracking one match.
#[derive(Debug, Clone)]
pub struct MatchStateMachine {
    phase: MatchPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for MatchStateMachine {
    fn default() -> Self {
        Self::resume(MatchPhase::NotStarted)
    }
}

impl MatchStateMachine {
    /// Create a state machine for a match that has not started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state machine for a match already persisted in `phase`.
    pub fn resume(phase: MatchPhase) -> Self {
        Self {
            phase,
            version: 0,
            pending: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate that `event` can be applied from the current phase and reserve the transition.
    pub fn plan(&mut self, event: MatchEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, returning the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<MatchPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: MatchEvent) -> Result<MatchPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (MatchPhase::NotStarted, MatchEvent::Start) => MatchPhase::Running(0),
            (MatchPhase::Running(index), MatchEvent::AllAnswered) => MatchPhase::Answered(index),
            (
                MatchPhase::Running(index) | MatchPhase::Answered(index),
                MatchEvent::NextQuestion,
            ) => MatchPhase::Running(index + 1),
            (MatchPhase::Running(_) | MatchPhase::Answered(_), MatchEvent::Finish) => {
                MatchPhase::Finished
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
