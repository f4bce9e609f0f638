//! Leaderboard listing with rank tiers, manual credits and resets.

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval_at, Instant},
};
use tracing::{info, warn};

use crate::{
    dao::models::{LeaderboardEntryEntity, LeaderboardIncrement},
    dto::leaderboard::{LeaderboardEntryDto, ResetLeaderboardResponse, UpdateLeaderboardRequest},
    error::ServiceError,
    services::ranking,
    state::SharedState,
};

const DEFAULT_LIMIT: usize = 50;

/// Highest points first; wins then uid break ties.
fn ranked(mut entries: Vec<LeaderboardEntryEntity>) -> Vec<LeaderboardEntryEntity> {
    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.wins.cmp(&a.wins))
            .then_with(|| a.uid.cmp(&b.uid))
    });
    entries
}

fn to_dto(state: &SharedState, position: usize, entry: LeaderboardEntryEntity) -> LeaderboardEntryDto {
    LeaderboardEntryDto {
        position,
        tier: ranking::tier_name(state.config(), entry.points),
        uid: entry.uid,
        display_name: entry.display_name,
        points: entry.points,
        wins: entry.wins,
        battles: entry.battles,
    }
}

/// Top `limit` entries by points (50 by default), ranked.
pub async fn list_leaderboard(
    state: &SharedState,
    limit: Option<usize>,
) -> Result<Vec<LeaderboardEntryDto>, ServiceError> {
    let store = state.require_store().await?;
    let entries = ranked(store.list_leaderboard().await?);
    Ok(entries
        .into_iter()
        .take(limit.unwrap_or(DEFAULT_LIMIT))
        .enumerate()
        .map(|(index, entry)| to_dto(state, index + 1, entry))
        .collect())
}

/// Credit a player outside of battle evaluation (solo games, corrections).
pub async fn update_leaderboard(
    state: &SharedState,
    request: UpdateLeaderboardRequest,
) -> Result<LeaderboardEntryDto, ServiceError> {
    let store = state.require_store().await?;
    let entry = store
        .increment_leaderboard(
            &request.uid,
            LeaderboardIncrement {
                display_name: request.display_name,
                points: request.points,
                wins: u32::from(request.won),
                battles: u32::from(request.battle || request.won),
            },
        )
        .await?;
    info!(uid = %entry.uid, points = entry.points, "leaderboard updated");

    let position = ranked(store.list_leaderboard().await?)
        .iter()
        .position(|candidate| candidate.uid == entry.uid)
        .map_or(0, |index| index + 1);
    Ok(to_dto(state, position, entry))
}

/// Drop every entry.
pub async fn reset_leaderboard(
    state: &SharedState,
) -> Result<ResetLeaderboardResponse, ServiceError> {
    let store = state.require_store().await?;
    let cleared = store.reset_leaderboard().await?;
    info!(cleared, "leaderboard reset");
    Ok(ResetLeaderboardResponse { cleared })
}

/// Reset the leaderboard every configured interval. Returns `None` when no interval is set.
pub fn spawn_scheduled_reset(state: &SharedState) -> Option<JoinHandle<()>> {
    let period = state.config().leaderboard_reset_interval?;
    let state = state.clone();
    info!(?period, "scheduled leaderboard reset enabled");

    Some(tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            if let Err(err) = reset_leaderboard(&state).await {
                warn!(error = %err, "scheduled leaderboard reset failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::realtime_store::{RealtimeStore, memory::MemoryRealtimeStore},
        state::AppState,
    };

    async fn setup(config: AppConfig) -> (SharedState, Arc<MemoryRealtimeStore>) {
        let state = AppState::new(config);
        let store = Arc::new(MemoryRealtimeStore::new());
        state.install_store(store.clone()).await;
        (state, store)
    }

    fn credit(uid: &str, points: u64, won: bool) -> UpdateLeaderboardRequest {
        UpdateLeaderboardRequest {
            uid: uid.into(),
            display_name: uid.to_uppercase(),
            points,
            won,
            battle: true,
        }
    }

    #[tokio::test]
    async fn listing_is_ranked_with_tiers() {
        let (state, _store) = setup(AppConfig::default()).await;
        update_leaderboard(&state, credit("low", 50, false)).await.unwrap();
        update_leaderboard(&state, credit("high", 650, true)).await.unwrap();
        let mid = update_leaderboard(&state, credit("mid", 300, true))
            .await
            .unwrap();
        assert_eq!(mid.position, 2);

        let board = list_leaderboard(&state, None).await.unwrap();
        let order: Vec<_> = board.iter().map(|entry| entry.uid.as_str()).collect();
        assert_eq!(order, ["high", "mid", "low"]);
        assert_eq!(board[0].tier, "Platinum");
        assert_eq!(board[1].tier, "Gold");
        assert_eq!(board[2].tier, "Bronze");
        assert_eq!(board[2].position, 3);

        assert_eq!(list_leaderboard(&state, Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_every_entry() {
        let (state, _store) = setup(AppConfig::default()).await;
        update_leaderboard(&state, credit("a", 5, false)).await.unwrap();
        update_leaderboard(&state, credit("b", 5, false)).await.unwrap();

        assert_eq!(reset_leaderboard(&state).await.unwrap().cleared, 2);
        assert!(list_leaderboard(&state, None).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_reset_runs_each_period() {
        let config = AppConfig {
            leaderboard_reset_interval: Some(Duration::from_secs(60)),
            ..AppConfig::default()
        };
        let (state, store) = setup(config).await;
        update_leaderboard(&state, credit("a", 5, false)).await.unwrap();

        let handle = spawn_scheduled_reset(&state).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.list_leaderboard().await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.list_leaderboard().await.unwrap().is_empty());
        handle.abort();
    }

    #[test]
    fn no_interval_means_no_task() {
        let state = AppState::new(AppConfig::default());
        assert!(spawn_scheduled_reset(&state).is_none());
    }
}
