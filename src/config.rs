//! Application-level configuration loading: match timings, bot behaviour and ranking tables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_BATTLE_BACK_CONFIG_PATH";

const MIN_PLAYERS: u8 = 2;
const MAX_PLAYERS: u8 = 4;
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Points threshold at which a named rank tier starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankTierConfig {
    /// Tier label shown to players.
    pub name: String,
    /// Lowest point total belonging to the tier.
    pub min_points: u64,
}

/// Leaderboard points credited per match outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingPoints {
    /// Points for the sole winner.
    pub win_points: u64,
    /// Points for each player tied at the top.
    pub draw_points: u64,
    /// Points for every other human.
    pub loss_points: u64,
}

impl Default for RankingPoints {
    fn default() -> Self {
        Self {
            win_points: 30,
            draw_points: 10,
            loss_points: 5,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Whether lone hosts get an AI opponent after [`Self::bot_backfill_delay`].
    pub bot_backfill_enabled: bool,
    /// Wait before a lone host gets a bot.
    pub bot_backfill_delay: Duration,
    /// Probability in `[0, 1]` that a bot answers correctly.
    pub bot_accuracy: f64,
    /// Answer time per battle question.
    pub battle_question_duration: Duration,
    /// Answer time per solo practice question.
    pub solo_question_duration: Duration,
    /// Seat limit used when a room does not ask for one.
    pub default_max_players: u8,
    /// Questions generated for a battle without explicit ids.
    pub default_question_count: usize,
    /// How often the countdown watchdog recomputes the displayed seconds.
    pub countdown_tick_interval: Duration,
    /// Arm a server-side watchdog that submits timeout answers when the countdown expires.
    pub auto_advance_on_timeout: bool,
    /// Limit on the persisting work of a match phase change.
    pub transition_timeout: Duration,
    /// Limit on one generator call before falling back.
    pub generation_timeout: Duration,
    /// Endpoint of the remote question generator. Mock questions are used when absent.
    pub question_api_url: Option<String>,
    /// Rank tiers sorted by ascending threshold.
    pub rank_tiers: Vec<RankTierConfig>,
    /// Points credited per outcome.
    pub ranking: RankingPoints,
    /// Period of the scheduled leaderboard reset, disabled when absent.
    pub leaderboard_reset_interval: Option<Duration>,
    /// Buffered events per SSE subscriber.
    pub sse_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        tiers = app_config.rank_tiers.len(),
                        bot_backfill = app_config.bot_backfill_enabled,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Clamp a requested seat count to the supported range, using the default when absent.
    pub fn clamp_max_players(&self, requested: Option<u8>) -> u8 {
        requested
            .unwrap_or(self.default_max_players)
            .clamp(MIN_PLAYERS, MAX_PLAYERS)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    bot_backfill_enabled: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    bot_backfill_delay_ms: Duration,
    bot_accuracy: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    battle_question_duration_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    solo_question_duration_ms: Duration,
    default_max_players: u8,
    default_question_count: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    countdown_tick_interval_ms: Duration,
    auto_advance_on_timeout: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    transition_timeout_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    generation_timeout_ms: Duration,
    question_api_url: Option<String>,
    rank_tiers: Vec<RankTierConfig>,
    ranking: RankingPoints,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    leaderboard_reset_interval_secs: Option<Duration>,
    sse_capacity: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            bot_backfill_enabled: true,
            bot_backfill_delay_ms: Duration::from_millis(5_000),
            bot_accuracy: 0.6,
            battle_question_duration_ms: Duration::from_millis(10_000),
            solo_question_duration_ms: Duration::from_millis(20_000),
            default_max_players: MAX_PLAYERS,
            default_question_count: 10,
            countdown_tick_interval_ms: Duration::from_millis(100),
            auto_advance_on_timeout: true,
            transition_timeout_ms: Duration::from_millis(5_000),
            generation_timeout_ms: Duration::from_millis(8_000),
            question_api_url: None,
            rank_tiers: default_rank_tiers(),
            ranking: RankingPoints::default(),
            leaderboard_reset_interval_secs: None,
            sse_capacity: 64,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut rank_tiers = if value.rank_tiers.is_empty() {
            default_rank_tiers()
        } else {
            value.rank_tiers
        };
        rank_tiers.sort_by_key(|tier| tier.min_points);

        Self {
            bot_backfill_enabled: value.bot_backfill_enabled,
            bot_backfill_delay: value.bot_backfill_delay_ms,
            bot_accuracy: value.bot_accuracy.clamp(0.0, 1.0),
            battle_question_duration: value.battle_question_duration_ms,
            solo_question_duration: value.solo_question_duration_ms,
            default_max_players: value.default_max_players.clamp(MIN_PLAYERS, MAX_PLAYERS),
            default_question_count: value.default_question_count.max(1),
            countdown_tick_interval: value.countdown_tick_interval_ms.max(MIN_TICK_INTERVAL),
            auto_advance_on_timeout: value.auto_advance_on_timeout,
            transition_timeout: value.transition_timeout_ms,
            generation_timeout: value.generation_timeout_ms,
            question_api_url: value.question_api_url.filter(|url| !url.trim().is_empty()),
            rank_tiers,
            ranking: value.ranking,
            leaderboard_reset_interval: value
                .leaderboard_reset_interval_secs
                .filter(|interval| !interval.is_zero()),
            sse_capacity: value.sse_capacity.max(1),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in tier table shipped with the binary.
fn default_rank_tiers() -> Vec<RankTierConfig> {
    [
        ("Bronze", 0),
        ("Silver", 100),
        ("Gold", 300),
        ("Platinum", 600),
        ("Diamond", 1_000),
        ("Master", 1_500),
        ("Grandmaster", 2_100),
        ("Challenger", 2_800),
    ]
    .into_iter()
    .map(|(name, min_points)| RankTierConfig {
        name: name.to_owned(),
        min_points,
    })
    .collect()
}
