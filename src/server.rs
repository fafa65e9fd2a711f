//! HTTP surface of the remote collection.
//!
//! | Method & path                       | Success                          | Failure |
//! |-------------------------------------|----------------------------------|---------|
//! | `POST /api/locations/bulk`          | 200 `{message, count}`           | 400 when the body is not an array of objects |
//! | `GET /api/locations`                | 200 array in storage order       | |
//! | `DELETE /api/locations/:index`      | 200 `{message, removed}`         | 404 when not an integer or out of range |
//! | `DELETE /api/locations/key/:key`    | 200 `{message, removed}`         | 404 for unknown keys |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde_json::{json, Value as JsonValue};

use crate::client::IDEMPOTENCY_HEADER;
use crate::config::{ServerConfig, StorageBackend};
use crate::error::CoreError;
use crate::remote_store::{LmdbLog, RemoteCollection, RemoteLog};

pub type SharedCollection = Arc<RemoteCollection>;

impl CoreError {
    /// Status code the HTTP surface answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::InvalidFormat(_) | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) | CoreError::Range { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            CoreError::InvalidFormat(_) => {
                (status, "Invalid format. Expected an array.").into_response()
            }
            CoreError::Range { .. } => {
                (status, Json(json!({ "message": "Invalid index" }))).into_response()
            }
            CoreError::NotFound(_) => {
                (status, Json(json!({ "message": "Unknown key" }))).into_response()
            }
            CoreError::Validation(reason) => {
                (status, Json(json!({ "message": format!("Invalid request: {reason}") })))
                    .into_response()
            }
            other => {
                warn!("Request failed: {other}");
                (status, "Internal server error").into_response()
            }
        }
    }
}

/// Builds the collection the configured backend asks for.
pub fn open_collection(config: &ServerConfig) -> Result<RemoteCollection, CoreError> {
    let log: Box<dyn RemoteLog> = match config.storage() {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; locations are lost on restart");
            Box::new(crate::remote_store::MemoryLog::new())
        }
        StorageBackend::Lmdb(dir) => {
            let log = LmdbLog::open(&dir)?;
            info!("Using durable storage at {}", log.path().display());
            Box::new(log)
        }
    };
    Ok(RemoteCollection::new(log))
}

pub fn router(collection: SharedCollection) -> Router {
    Router::new()
        .route("/api/locations/bulk", post(bulk_append))
        .route("/api/locations", get(list_locations))
        .route("/api/locations/:index", delete(delete_at_index))
        .route("/api/locations/key/:key", delete(delete_by_key))
        .with_state(collection)
}

/// Serves the collection on an already bound listener until the task is
/// dropped or the server fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    collection: SharedCollection,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    if let Some(addr) = addr {
        info!("Server is running at http://{addr}");
    }
    axum::serve(listener, router(collection)).await
}

async fn bulk_append(
    State(collection): State<SharedCollection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<JsonValue>, CoreError> {
    let payload: JsonValue = serde_json::from_slice(&body)
        .map_err(|e| CoreError::InvalidFormat(format!("body is not JSON: {e}")))?;
    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = collection.bulk_append(payload, idempotency_key)?;
    Ok(Json(json!({ "message": "Success", "count": outcome.count })))
}

async fn list_locations(
    State(collection): State<SharedCollection>,
) -> Result<Json<Vec<JsonValue>>, CoreError> {
    let entries = collection.list()?;
    Ok(Json(entries.iter().map(|entry| entry.to_json()).collect()))
}

async fn delete_at_index(
    State(collection): State<SharedCollection>,
    Path(raw): Path<String>,
) -> Result<Json<JsonValue>, CoreError> {
    let index: i64 = raw.trim().parse().map_err(|_| CoreError::Range {
        index: -1,
        len: collection.len().unwrap_or_default(),
    })?;
    let removed = collection.delete_at(index)?;
    Ok(Json(json!({ "message": "Deleted", "removed": removed.to_json() })))
}

async fn delete_by_key(
    State(collection): State<SharedCollection>,
    Path(raw): Path<String>,
) -> Result<Json<JsonValue>, CoreError> {
    let key: u64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::NotFound(format!("{raw:?} is not a key")))?;
    let removed = collection.delete_by_key(key)?;
    Ok(Json(json!({ "message": "Deleted", "removed": removed.to_json() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> JsonValue {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_errors_answer_bad_request_with_reason() {
        let response = CoreError::Validation("name must not be empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Invalid request: name must not be empty" })
        );
    }

    #[tokio::test]
    async fn range_and_unknown_key_answer_not_found() {
        let response = CoreError::Range { index: 7, len: 1 }.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "message": "Invalid index" }));

        let response = CoreError::NotFound("key 3".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "message": "Unknown key" }));
    }
}
