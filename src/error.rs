//! Error taxonomy shared by the stores and coordinators.

use thiserror::Error;

/// Errors raised by the local store, the remote collection and the
/// coordinators that drive them.
///
/// Every coordinator catches these at its operation boundary, logs them and
/// turns them into an operator notice; nothing here is allowed to abort the
/// host process.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Local storage is unavailable or corrupt.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Transport failure, timeout, non-2xx status or malformed acknowledgement.
    #[error("network error: {0}")]
    Network(String),

    /// Bulk payload was not an array of record objects.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A local id or remote key does not exist (anymore).
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote position outside `[0, len)`.
    #[error("index {index} out of range for {len} record(s)")]
    Range { index: i64, len: usize },

    /// Operator input or a state transition was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// The location collaborator could not produce a fix.
    #[error("location unavailable: {0}")]
    Location(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The remote acknowledged the batch but only part of it was marked
    /// synced locally. The remaining records will be resent.
    #[error("sync committed {committed} of {total} record(s): {reason}")]
    PartialCommit {
        committed: usize,
        total: usize,
        reason: String,
    },
}

impl From<lmdb::Error> for CoreError {
    fn from(err: lmdb::Error) -> Self {
        match err {
            lmdb::Error::NotFound => CoreError::NotFound("key not found in LMDB".to_string()),
            lmdb::Error::Corrupted => CoreError::Persistence("database is corrupted".to_string()),
            lmdb::Error::MapFull => CoreError::Persistence("database map is full".to_string()),
            _ => CoreError::Persistence(format!("LMDB error: {err}")),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(format!("JSON error: {err}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CoreError::Network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            CoreError::Network(format!("malformed response body: {err}"))
        } else {
            CoreError::Network(err.to_string())
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CoreError::Persistence("collection lock poisoned".to_string())
    }
}
