//! Rank tiers derived from leaderboard points, and per-outcome credits.

use crate::{
    config::{AppConfig, RankTierConfig, RankingPoints},
    dao::models::MatchOutcome,
};

const UNRANKED: &str = "Unranked";

/// Name of the tier reached with `points`, given tiers sorted by ascending threshold.
pub fn tier_for(tiers: &[RankTierConfig], points: u64) -> &str {
    tiers
        .iter()
        .rev()
        .find(|tier| points >= tier.min_points)
        .map(|tier| tier.name.as_str())
        .unwrap_or(UNRANKED)
}

/// Leaderboard points credited for `outcome`.
pub fn points_for(ranking: &RankingPoints, outcome: MatchOutcome) -> u64 {
    match outcome {
        MatchOutcome::Win => ranking.win_points,
        MatchOutcome::Draw => ranking.draw_points,
        MatchOutcome::Loss => ranking.loss_points,
    }
}

/// Outcome of `uid` given the winner of the match (`None` for a draw).
pub fn outcome_for(uid: &str, winner_id: Option<&str>) -> MatchOutcome {
    match winner_id {
        None => MatchOutcome::Draw,
        Some(winner) if winner == uid => MatchOutcome::Win,
        Some(_) => MatchOutcome::Loss,
    }
}

/// Convenience accessor on the loaded configuration.
pub fn tier_name(config: &AppConfig, points: u64) -> String {
    tier_for(&config.rank_tiers, points).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_boundaries() {
        let config = AppConfig::default();
        assert_eq!(tier_name(&config, 0), "Bronze");
        assert_eq!(tier_name(&config, 99), "Bronze");
        assert_eq!(tier_name(&config, 100), "Silver");
        assert_eq!(tier_name(&config, 599), "Gold");
        assert_eq!(tier_name(&config, 2_100), "Grandmaster");
        assert_eq!(tier_name(&config, 1_000_000), "Challenger");
    }

    #[test]
    fn points_below_first_threshold_are_unranked() {
        let tiers = vec![RankTierConfig {
            name: "Pro".into(),
            min_points: 50,
        }];
        assert_eq!(tier_for(&tiers, 10), UNRANKED);
        assert_eq!(tier_for(&[], 10), UNRANKED);
    }

    #[test]
    fn outcomes_follow_the_winner() {
        let ranking = RankingPoints::default();
        assert_eq!(outcome_for("a", Some("a")), MatchOutcome::Win);
        assert_eq!(outcome_for("b", Some("a")), MatchOutcome::Loss);
        assert_eq!(outcome_for("a", None), MatchOutcome::Draw);
        assert_eq!(points_for(&ranking, MatchOutcome::Win), 30);
        assert_eq!(points_for(&ranking, MatchOutcome::Draw), 10);
        assert_eq!(points_for(&ranking, MatchOutcome::Loss), 5);
    }
}
