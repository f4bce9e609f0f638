//! Achievement badges derived from archived battles and leaderboard standing.

use serde_json::{Map, Value};
use tracing::info;

use crate::{
    dao::models::BattleResultEntity,
    dto::leaderboard::{BadgeDto, BadgesResponse},
    error::ServiceError,
    state::SharedState,
};

const PROFILE_BADGES_FIELD: &str = "badges";
const VETERAN_BATTLES: usize = 10;
const CHAMPION_WINS: usize = 10;
const HOT_STREAK_WINS: usize = 3;
const RISING_STAR_POINTS: u64 = 300;

/// Badge catalog: identifier, display name, description.
const BADGES: &[(&str, &str, &str)] = &[
    ("first_battle", "First Battle", "Finish your first battle."),
    ("first_victory", "First Victory", "Win a battle."),
    ("veteran", "Veteran", "Finish 10 battles."),
    ("champion", "Champion", "Win 10 battles."),
    ("hot_streak", "Hot Streak", "Win 3 battles in a row."),
    ("rising_star", "Rising Star", "Reach 300 leaderboard points."),
];

/// Battle record of one player, oldest battle first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct BattleRecord {
    battles: usize,
    wins: usize,
    best_streak: usize,
}

impl BattleRecord {
    fn of(uid: &str, results: &[BattleResultEntity]) -> Self {
        let mut record = Self::default();
        let mut streak = 0;
        for result in results
            .iter()
            .filter(|result| result.participants.iter().any(|p| p == uid))
        {
            record.battles += 1;
            if result.winner_id.as_deref() == Some(uid) {
                record.wins += 1;
                streak += 1;
                record.best_streak = record.best_streak.max(streak);
            } else {
                streak = 0;
            }
        }
        record
    }
}

fn earned(record: &BattleRecord, points: u64) -> Vec<&'static str> {
    let checks = [
        ("first_battle", record.battles >= 1),
        ("first_victory", record.wins >= 1),
        ("veteran", record.battles >= VETERAN_BATTLES),
        ("champion", record.wins >= CHAMPION_WINS),
        ("hot_streak", record.best_streak >= HOT_STREAK_WINS),
        ("rising_star", points >= RISING_STAR_POINTS),
    ];
    checks
        .into_iter()
        .filter_map(|(id, held)| held.then_some(id))
        .collect()
}

fn badge(id: &str) -> Option<BadgeDto> {
    BADGES
        .iter()
        .find(|(badge_id, _, _)| *badge_id == id)
        .map(|(id, name, description)| BadgeDto {
            id: (*id).to_owned(),
            name: (*name).to_owned(),
            description: (*description).to_owned(),
        })
}

/// Compute the badges `uid` holds and record new ones on the profile.
pub async fn evaluate_badges(state: &SharedState, uid: &str) -> Result<BadgesResponse, ServiceError> {
    let store = state.require_store().await?;

    let mut results = store.list_battle_results().await?;
    results.sort_by_key(|result| result.finished_at);
    let record = BattleRecord::of(uid, &results);
    let points = store
        .list_leaderboard()
        .await?
        .into_iter()
        .find(|entry| entry.uid == uid)
        .map_or(0, |entry| entry.points);

    let held: Vec<String> = store
        .find_profile(uid)
        .await?
        .and_then(|profile| profile.get(PROFILE_BADGES_FIELD).cloned())
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();

    let ids = earned(&record, points);
    let newly_earned: Vec<String> = ids
        .iter()
        .filter(|id| !held.iter().any(|held| held == *id))
        .map(|id| (*id).to_owned())
        .collect();

    if !newly_earned.is_empty() {
        let mut all = held.clone();
        all.extend(newly_earned.iter().cloned());
        let mut updates = Map::new();
        updates.insert(
            PROFILE_BADGES_FIELD.to_owned(),
            Value::from(all),
        );
        store.merge_profile(uid, updates).await?;
        info!(uid, badges = ?newly_earned, "badges earned");
    }

    Ok(BadgesResponse {
        uid: uid.to_owned(),
        badges: ids.into_iter().filter_map(badge).collect(),
        newly_earned,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{Difficulty, LeaderboardIncrement},
            realtime_store::{RealtimeStore, memory::MemoryRealtimeStore},
        },
        state::AppState,
    };

    fn result(at: u64, winner: Option<&str>) -> BattleResultEntity {
        BattleResultEntity {
            id: String::new(),
            room_id: format!("room{at}"),
            topic: "maths".into(),
            difficulty: Difficulty::Easy,
            participants: vec!["ada".into(), "bob".into()],
            winner_id: winner.map(str::to_owned),
            scores: IndexMap::new(),
            finished_at: at,
        }
    }

    #[test]
    fn streaks_reset_on_loss_or_draw() {
        let results = vec![
            result(1, Some("ada")),
            result(2, Some("ada")),
            result(3, None),
            result(4, Some("ada")),
        ];
        let record = BattleRecord::of("ada", &results);
        assert_eq!(record.battles, 4);
        assert_eq!(record.wins, 3);
        assert_eq!(record.best_streak, 2);
        assert_eq!(BattleRecord::of("carol", &results), BattleRecord::default());
    }

    #[test]
    fn thresholds_unlock_badges() {
        let record = BattleRecord {
            battles: 10,
            wins: 3,
            best_streak: 3,
        };
        assert_eq!(
            earned(&record, 0),
            ["first_battle", "first_victory", "veteran", "hot_streak"]
        );
        assert_eq!(earned(&BattleRecord::default(), 300), ["rising_star"]);
    }

    #[tokio::test]
    async fn new_badges_are_recorded_once() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryRealtimeStore::new());
        state.install_store(store.clone()).await;
        store.save_battle_result(result(1, Some("ada"))).await.unwrap();
        store
            .increment_leaderboard(
                "ada",
                LeaderboardIncrement {
                    display_name: "Ada".into(),
                    points: 30,
                    wins: 1,
                    battles: 1,
                },
            )
            .await
            .unwrap();

        let first = evaluate_badges(&state, "ada").await.unwrap();
        assert_eq!(first.newly_earned, ["first_battle", "first_victory"]);
        assert_eq!(first.badges.len(), 2);

        let profile = store.find_profile("ada").await.unwrap().unwrap();
        assert_eq!(profile["badges"], serde_json::json!(["first_battle", "first_victory"]));

        let second = evaluate_badges(&state, "ada").await.unwrap();
        assert!(second.newly_earned.is_empty());
        assert_eq!(second.badges.len(), 2);
    }
}
