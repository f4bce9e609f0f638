use serde::Serialize;
use utoipa::ToSchema;

/// Body of `GET /api/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the realtime store is unreachable.
    pub status: String,
    /// Profile writes waiting for the store to come back.
    pub pending_writes: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, pending_writes: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_owned(),
            pending_writes,
        }
    }
}
