use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What went wrong talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// A required `COUCH_*` variable is unset or blank.
    #[error("CouchDB setting `{0}` is not set")]
    MissingSetting(&'static str),
    /// The HTTP client could not be built.
    #[error("CouchDB HTTP client could not be built")]
    Client(#[source] reqwest::Error),
    /// The request never got an answer, or its body could not be read.
    #[error("CouchDB request for `{target}` failed")]
    Transport {
        /// Database, document id or endpoint involved.
        target: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with an unexpected status.
    #[error("CouchDB answered {status} for `{target}`")]
    Status {
        /// Database, document id or endpoint involved.
        target: String,
        /// Status received.
        status: StatusCode,
    },
    /// A stored document does not match its model.
    #[error("CouchDB document `{target}` does not match its model")]
    Decode {
        /// Document id.
        target: String,
        /// Deserialization failure.
        #[source]
        source: serde_json::Error,
    },
    /// Every revision-guarded retry lost against another writer.
    #[error("document `{0}` kept changing while being updated")]
    Contended(String),
}

impl CouchDaoError {
    pub(crate) fn transport(target: impl Into<String>) -> impl FnOnce(reqwest::Error) -> Self {
        let target = target.into();
        move |source| CouchDaoError::Transport { target, source }
    }

    pub(crate) fn status(target: impl Into<String>, status: StatusCode) -> Self {
        CouchDaoError::Status {
            target: target.into(),
            status,
        }
    }
}
