//! CouchDB-backed realtime store.

mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchRealtimeStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::Contended(path) => StorageError::conflict(path),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
