//! Runtime configuration for the device side and the server side.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::CoreError;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_SERVER_URL: &str = "FIELD_SYNC_URL";
const ENV_TIMEOUT_SECS: &str = "FIELD_SYNC_TIMEOUT_SECS";
const ENV_IDEMPOTENT: &str = "FIELD_SYNC_IDEMPOTENT";

/// Device-side settings for reaching the remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub server_url: String,
    pub timeout: Duration,
    /// Send a batch idempotency key so a retried identical batch is not
    /// appended twice. Off by default: plain at-least-once delivery.
    pub idempotent_batches: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            idempotent_batches: false,
        }
    }
}

impl SyncConfig {
    pub fn with_server_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Reads `FIELD_SYNC_URL`, `FIELD_SYNC_TIMEOUT_SECS` and
    /// `FIELD_SYNC_IDEMPOTENT`, falling back to defaults for unset values.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.trim().is_empty()) {
            config.server_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CoreError::Validation(format!("{ENV_TIMEOUT_SECS} must be a whole number, got {raw:?}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_IDEMPOTENT) {
            config.idempotent_batches = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        Ok(config)
    }
}

/// Where the server keeps the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process memory; contents are lost on restart.
    Memory,
    /// LMDB environment in the given directory.
    Lmdb(PathBuf),
}

/// Server-side settings, parsed from the command line with environment
/// fallbacks.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "FIELD_SERVER_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Keep the collection in an LMDB directory instead of memory
    #[arg(long, env = "FIELD_SERVER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn storage(&self) -> StorageBackend {
        match &self.data_dir {
            Some(dir) => StorageBackend::Lmdb(dir.clone()),
            None => StorageBackend::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.server_url, "http://localhost:5000");
    }

    #[test]
    fn reads_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("FIELD_SYNC_URL", " https://sync.example.org "),
            ("FIELD_SYNC_TIMEOUT_SECS", "5"),
            ("FIELD_SYNC_IDEMPOTENT", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(config.server_url, "https://sync.example.org");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.idempotent_batches);
    }

    #[test]
    fn rejects_bad_timeout() {
        let err = SyncConfig::from_lookup(lookup(&[("FIELD_SYNC_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn data_dir_selects_lmdb_backend() {
        let config = ServerConfig {
            bind: "127.0.0.1:5000".parse().unwrap(),
            data_dir: Some(PathBuf::from("/var/lib/field")),
        };
        assert_eq!(
            config.storage(),
            StorageBackend::Lmdb(PathBuf::from("/var/lib/field"))
        );
    }
}
