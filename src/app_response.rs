use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::error::CoreError;

/// JSON envelope returned by every FFI function.
#[derive(Debug, Serialize, Deserialize)]
pub enum AppResponse {
    PersistenceError(String),
    NetworkError(String),
    InvalidFormatError(String),
    NotFound(String),
    RangeError(String),
    ValidationError(String),
    LocationError(String),
    SerializationError(String),
    PartialCommit(String),
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            AppResponse::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AppResponse::InvalidFormatError(msg) => write!(f, "Invalid format: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::RangeError(msg) => write!(f, "Out of range: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::LocationError(msg) => write!(f, "Location error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::PartialCommit(msg) => write!(f, "Partial commit: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<CoreError> for AppResponse {
    fn from(err: CoreError) -> Self {
        let msg = err.to_string();
        match err {
            CoreError::Persistence(_) => AppResponse::PersistenceError(msg),
            CoreError::Network(_) => AppResponse::NetworkError(msg),
            CoreError::InvalidFormat(_) => AppResponse::InvalidFormatError(msg),
            CoreError::NotFound(_) => AppResponse::NotFound(msg),
            CoreError::Range { .. } => AppResponse::RangeError(msg),
            CoreError::Validation(_) => AppResponse::ValidationError(msg),
            CoreError::Location(_) => AppResponse::LocationError(msg),
            CoreError::Serialization(_) => AppResponse::SerializationError(msg),
            CoreError::PartialCommit { .. } => AppResponse::PartialCommit(msg),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    /// Wraps a serializable payload, or reports why it could not be encoded.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => AppResponse::from(e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }
}
