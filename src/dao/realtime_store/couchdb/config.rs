use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "quiz_battle";
const DEFAULT_FEED_CAPACITY: usize = 32;

/// Connection settings of the CouchDB realtime store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    /// Server URL without trailing slash.
    pub base_url: String,
    /// Database holding every collection.
    pub database: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Capacity of each per-record change channel.
    pub feed_capacity: usize,
}

impl CouchConfig {
    /// Settings for `database` on `base_url`, without credentials.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            database: database.into(),
            username: None,
            password: None,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (default `quiz_battle`),
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` and `COUCH_FEED_CAPACITY`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let base_url = value("COUCH_BASE_URL").ok_or(CouchDaoError::MissingSetting("COUCH_BASE_URL"))?;
        let database = value("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.into());

        let mut config = Self::new(base_url, database);
        if let (Some(username), Some(password)) = (value("COUCH_USERNAME"), value("COUCH_PASSWORD"))
        {
            config = config.with_credentials(username, password);
        }
        if let Some(capacity) = value("COUCH_FEED_CAPACITY").and_then(|raw| raw.parse().ok()) {
            config.feed_capacity = usize::max(capacity, 1);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn base_url_is_required() {
        let err = CouchConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, CouchDaoError::MissingSetting("COUCH_BASE_URL")));
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config =
            CouchConfig::from_lookup(lookup(&[("COUCH_BASE_URL", "http://couch:5984/")])).unwrap();
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(config.database, "quiz_battle");
        assert_eq!(config.username, None);
        assert_eq!(config.feed_capacity, DEFAULT_FEED_CAPACITY);
    }

    #[test]
    fn credentials_need_both_halves() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_USERNAME", "admin"),
        ]))
        .unwrap();
        assert_eq!(config.username, None);

        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_DB", "battles"),
            ("COUCH_USERNAME", "admin"),
            ("COUCH_PASSWORD", "secret"),
            ("COUCH_FEED_CAPACITY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.database, "battles");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.feed_capacity, 1);
    }
}
