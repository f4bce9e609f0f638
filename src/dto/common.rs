use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::models::{BattlePlayerEntity, CountdownEntity};

/// Player seated in a room.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub uid: String,
    pub display_name: String,
    pub is_ready: bool,
    pub is_bot: bool,
    pub joined_at: String,
}

impl From<&BattlePlayerEntity> for PlayerSummary {
    fn from(player: &BattlePlayerEntity) -> Self {
        Self {
            uid: player.uid.clone(),
            display_name: player.display_name.clone(),
            is_ready: player.is_ready,
            is_bot: player.is_bot,
            joined_at: super::format_epoch_ms(player.joined_at),
        }
    }
}

/// Countdown descriptor. Clients derive the remaining time from `endsAt` corrected by
/// the skew between `serverNow` and their local clock at receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountdownDto {
    pub duration_ms: u64,
    pub ends_at: u64,
    pub running: bool,
    pub server_now: u64,
}

impl CountdownDto {
    /// Project a stored countdown, stamping the server clock at send time.
    pub fn stamped(countdown: &CountdownEntity, now: u64) -> Self {
        Self {
            duration_ms: countdown.duration_ms,
            ends_at: countdown.ends_at,
            running: countdown.running,
            server_now: now,
        }
    }
}

impl From<CountdownDto> for CountdownEntity {
    fn from(value: CountdownDto) -> Self {
        Self {
            duration_ms: value.duration_ms,
            ends_at: value.ends_at,
            running: value.running,
            server_now: value.server_now,
        }
    }
}
