//! Persistence: document models and the realtime store behind them.

/// Database model definitions.
pub mod models;
/// Realtime record storage, retrieval and change feeds.
pub mod realtime_store;
/// Storage abstraction layer for database operations.
pub mod storage;
