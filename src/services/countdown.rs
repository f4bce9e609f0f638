//! Skew-corrected countdown display and the ticker driving it.

use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};

use crate::dao::models::CountdownEntity;

/// A countdown as received from the server, pinned to the local receipt instant.
///
/// The remaining time is `endsAt - (nowLocal + (serverNow - receivedAtLocal))`, which is
/// the server deadline minus the server clock extrapolated with the local elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct CountdownView {
    countdown: CountdownEntity,
    received_at: Instant,
}

impl CountdownView {
    /// Pin `countdown` to the current local instant.
    pub fn received(countdown: CountdownEntity) -> Self {
        Self::received_at(countdown, Instant::now())
    }

    /// Pin `countdown` to `received_at`.
    pub fn received_at(countdown: CountdownEntity, received_at: Instant) -> Self {
        Self {
            countdown,
            received_at,
        }
    }

    /// Milliseconds left at `now`, clamped at zero. Zero when the countdown is stopped.
    pub fn remaining_ms_at(&self, now: Instant) -> u64 {
        if !self.countdown.running {
            return 0;
        }
        let elapsed = u64::try_from(now.saturating_duration_since(self.received_at).as_millis())
            .unwrap_or(u64::MAX);
        let server_now = self.countdown.server_now.saturating_add(elapsed);
        self.countdown.ends_at.saturating_sub(server_now)
    }

    /// Whole seconds shown to the player at `now` (rounded up).
    pub fn remaining_secs_at(&self, now: Instant) -> u64 {
        self.remaining_ms_at(now).div_ceil(1_000)
    }

    /// Whether nothing is left at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.remaining_ms_at(now) == 0
    }
}

/// Spawn a task recomputing `view` every `tick`.
///
/// `on_change` receives each new displayed value (including the first one); `on_timeout`
/// fires exactly once when the remaining time reaches zero, after which the task ends.
pub fn spawn_ticker<C, T>(
    view: CountdownView,
    tick: Duration,
    mut on_change: C,
    on_timeout: T,
) -> JoinHandle<()>
where
    C: FnMut(u64) + Send + 'static,
    T: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticks = interval(tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut displayed = None;

        loop {
            ticks.tick().await;
            let now = Instant::now();
            let secs = view.remaining_secs_at(now);
            if displayed != Some(secs) {
                displayed = Some(secs);
                on_change(secs);
            }
            if view.is_expired_at(now) {
                on_timeout();
                break;
            }
        }
    })
}
