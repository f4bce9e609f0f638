use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Result of a profile update.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateResponse {
    pub uid: String,
    /// True when the store was unreachable and the update waits in the pending queue.
    pub queued: bool,
    /// Merged profile, absent when queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub profile: Option<Map<String, Value>>,
}
