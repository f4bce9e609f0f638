//! Business logic invoked by the HTTP routes.

/// Achievement badges derived from battle history.
pub mod badge_service;
/// AI opponents: backfill timers and simulated answers.
pub mod bot;
/// Skew-corrected countdown display and ticker.
pub mod countdown;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Leaderboard listing, credits and resets.
pub mod leaderboard_service;
/// Match progression and result evaluation.
pub mod match_service;
/// Profile updates and the pending write queue.
pub mod profile_service;
/// Question generation with fallback, and explanations.
pub mod question_service;
/// Rank tiers and outcome points.
pub mod ranking;
/// Room lifecycle operations.
pub mod room_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streams.
pub mod sse_service;
/// Storage connection supervisor with degraded mode handling.
pub mod storage_supervisor;
/// In-process room and match subscriptions.
pub mod subscription_service;
