//! Match phase transitions driven through a coordinator.

use crate::{
    error::ServiceError,
    services::sse_events::broadcast_match_phase,
    state::{GateGuard, MatchCoordinator, SharedState, state_machine::MatchEvent},
};

/// Execute a planned match transition, then broadcast the resulting phase on the lobby stream.
pub async fn run_transition_with_broadcast<F, Fut, T>(
    state: &SharedState,
    coordinator: &MatchCoordinator,
    gate: &GateGuard<'_>,
    event: MatchEvent,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let (res, next) = coordinator.transition(gate, event, work).await?;
    broadcast_match_phase(state, coordinator.room_id(), &next);
    Ok(res)
}
