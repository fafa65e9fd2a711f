//! How the device reaches the remote collection.
//!
//! [`RemoteApi`] is the seam the coordinators are written against.
//! [`HttpRemote`] talks to a `location-server` over HTTP/JSON; the
//! [`RemoteCollection`] itself also implements the trait for in-process use.

use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::location_record::{RemoteRecord, WireRecord};
use crate::remote_store::{RemoteCollection, RemoteEntry};

/// Header carrying the optional batch idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Operations the device performs against the remote collection.
pub trait RemoteApi {
    /// Sends the whole batch in one call and returns the acknowledged count.
    fn bulk_append(
        &self,
        records: &[WireRecord],
        idempotency_key: Option<&str>,
    ) -> Result<usize, CoreError>;

    fn list(&self) -> Result<Vec<RemoteRecord>, CoreError>;

    fn delete_at(&self, index: i64) -> Result<RemoteRecord, CoreError>;

    fn delete_by_key(&self, key: u64) -> Result<RemoteRecord, CoreError>;
}

#[derive(Debug, Deserialize)]
struct BulkAck {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct DeleteAck {
    removed: JsonValue,
}

/// Blocking HTTP client for the `/api/locations` endpoints.
pub struct HttpRemote {
    base_url: String,
    http_client: Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CoreError::Validation(
                "server url must not be empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, CoreError> {
        Self::new(config.server_url.clone(), config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a DELETE. A 404 is turned into the error `not_found` builds
    /// from the response body.
    fn delete<F>(&self, path: &str, not_found: F) -> Result<RemoteRecord, CoreError>
    where
        F: FnOnce(String) -> CoreError,
    {
        let response = self.http_client.delete(self.url(path)).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().unwrap_or_default();
            return Err(not_found(body));
        }
        let ack: DeleteAck = ensure_success(response)?.json()?;
        RemoteRecord::from_json(&ack.removed).ok_or_else(|| {
            CoreError::Network(format!("malformed delete acknowledgement: {}", ack.removed))
        })
    }
}

/// Decodes a listed collection. Elements that are not objects are skipped.
fn decode_list(values: Vec<JsonValue>) -> Vec<RemoteRecord> {
    values
        .iter()
        .enumerate()
        .filter_map(|(position, value)| {
            let record = RemoteRecord::from_json(value);
            if record.is_none() {
                warn!("Skipping remote element {position}: not an object: {value}");
            }
            record
        })
        .collect()
}

fn ensure_success(response: Response) -> Result<Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "Unknown error".to_string());
    warn!("Remote answered HTTP {status}: {body}");
    Err(CoreError::Network(format!("HTTP {status}: {body}")))
}

impl RemoteApi for HttpRemote {
    fn bulk_append(
        &self,
        records: &[WireRecord],
        idempotency_key: Option<&str>,
    ) -> Result<usize, CoreError> {
        debug!("POST {} location(s) to {}", records.len(), self.base_url);
        let mut request = self
            .http_client
            .post(self.url("/api/locations/bulk"))
            .json(records);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = ensure_success(request.send()?)?;
        let ack: BulkAck = response
            .json()
            .map_err(|e| CoreError::Network(format!("malformed acknowledgement: {e}")))?;
        Ok(ack.count)
    }

    fn list(&self) -> Result<Vec<RemoteRecord>, CoreError> {
        let response = self.http_client.get(self.url("/api/locations")).send()?;
        let values: Vec<JsonValue> = ensure_success(response)?.json()?;
        Ok(decode_list(values))
    }

    fn delete_at(&self, index: i64) -> Result<RemoteRecord, CoreError> {
        self.delete(&format!("/api/locations/{index}"), |body| {
            debug!("Position {index} rejected: {body}");
            let len = self.list().map(|records| records.len()).unwrap_or_default();
            CoreError::Range { index, len }
        })
    }

    fn delete_by_key(&self, key: u64) -> Result<RemoteRecord, CoreError> {
        let path = format!("/api/locations/key/{key}");
        self.delete(&path, |body| CoreError::NotFound(format!("{path}: {body}")))
    }
}

fn entry_to_record(entry: &RemoteEntry) -> Result<RemoteRecord, CoreError> {
    RemoteRecord::from_json(&entry.to_json())
        .ok_or_else(|| CoreError::Persistence(format!("remote entry {} is not an object", entry.key)))
}

impl RemoteApi for RemoteCollection {
    fn bulk_append(
        &self,
        records: &[WireRecord],
        idempotency_key: Option<&str>,
    ) -> Result<usize, CoreError> {
        let payload: JsonValue = serde_json::to_value(records)?;
        Ok(RemoteCollection::bulk_append(self, payload, idempotency_key)?.count)
    }

    fn list(&self) -> Result<Vec<RemoteRecord>, CoreError> {
        RemoteCollection::list(self)?
            .iter()
            .map(entry_to_record)
            .collect()
    }

    fn delete_at(&self, index: i64) -> Result<RemoteRecord, CoreError> {
        entry_to_record(&RemoteCollection::delete_at(self, index)?)
    }

    fn delete_by_key(&self, key: u64) -> Result<RemoteRecord, CoreError> {
        entry_to_record(&RemoteCollection::delete_by_key(self, key)?)
    }
}
