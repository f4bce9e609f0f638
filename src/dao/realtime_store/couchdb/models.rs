use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROOM_PREFIX: &str = "battle_rooms::";
pub const MATCH_PREFIX: &str = "matches::";
pub const RESULT_PREFIX: &str = "battle_results::";
pub const QUESTION_PREFIX: &str = "questions::";
pub const USER_PREFIX: &str = "users::";
pub const LEADERBOARD_PREFIX: &str = "leaderboard::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
    #[serde(default)]
    pub value: Option<AllDocsValue>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsValue {
    pub rev: String,
}

/// Envelope adding CouchDB's `_id`/`_rev` bookkeeping around any stored body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, rev: Option<String>, body: T) -> Self {
        Self { id, rev, body }
    }
}

/// Document identifier for `key` inside the collection identified by `prefix`.
pub fn doc_id(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}
