use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod battle;
pub mod common;
pub mod health;
pub mod leaderboard;
pub mod profile;
pub mod question;
pub mod room;
pub mod sse;
pub mod validation;

/// Render an epoch-milliseconds timestamp as RFC 3339.
fn format_epoch_ms(epoch_ms: u64) -> String {
    let nanos = i128::from(epoch_ms) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}
