use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dto::validation::validate_not_blank;

/// Paging of the leaderboard listing.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    /// Maximum number of entries (default 50).
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

/// Ranked leaderboard row.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryDto {
    /// 1-based position.
    pub position: usize,
    pub uid: String,
    pub display_name: String,
    pub points: u64,
    pub wins: u32,
    pub battles: u32,
    pub tier: String,
}

/// Manual leaderboard credit (solo games and admin corrections).
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeaderboardRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
    #[validate(length(max = 40))]
    #[serde(default)]
    pub display_name: String,
    pub points: u64,
    #[serde(default)]
    pub won: bool,
    /// Count this update as a played battle.
    #[serde(default)]
    pub battle: bool,
}

/// Result of a leaderboard reset.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetLeaderboardResponse {
    pub cleared: usize,
}

/// Request to evaluate the badges of a player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateBadgesRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub uid: String,
}

/// Badge earned by a player.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDto {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Every badge a player currently holds.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BadgesResponse {
    pub uid: String,
    pub badges: Vec<BadgeDto>,
    /// Badges that were not recorded on the profile before this evaluation.
    pub newly_earned: Vec<String>,
}
