//! The shared remote collection that synced records are appended to.
//!
//! Storage is injected through [`RemoteLog`]: [`MemoryLog`] keeps everything
//! in process memory and is lost on restart, [`LmdbLog`] persists entries in
//! an LMDB environment. Either way the collection behaves as an append-only
//! list with positional access, and every entry also gets a stable key when
//! it is appended so callers do not have to rely on positions that shift.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{info, warn};
use serde_json::{Map, Value as JsonValue};

use crate::error::CoreError;

/// One stored entry: the submitted JSON object and the key it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub key: u64,
    pub record: Map<String, JsonValue>,
}

impl RemoteEntry {
    /// The record as listed to clients, with its key merged in.
    pub fn to_json(&self) -> JsonValue {
        let mut object = self.record.clone();
        object.insert("key".to_string(), JsonValue::from(self.key));
        JsonValue::Object(object)
    }
}

/// Append-only storage with positional removal.
pub trait RemoteLog: Send {
    /// Appends the records in order, assigning each a fresh key.
    fn append(&mut self, records: Vec<Map<String, JsonValue>>) -> Result<Vec<u64>, CoreError>;

    /// All entries in storage order.
    fn entries(&self) -> Result<Vec<RemoteEntry>, CoreError>;

    fn len(&self) -> Result<usize, CoreError>;

    fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len()? == 0)
    }

    /// Removes the entry at `index`; later entries shift down by one.
    fn remove_at(&mut self, index: usize) -> Result<RemoteEntry, CoreError>;

    /// Removes the entry carrying `key`, or returns `None`.
    fn remove_key(&mut self, key: u64) -> Result<Option<RemoteEntry>, CoreError>;
}

/// Volatile storage: a vector in process memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Vec<RemoteEntry>,
    next_key: u64,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteLog for MemoryLog {
    fn append(&mut self, records: Vec<Map<String, JsonValue>>) -> Result<Vec<u64>, CoreError> {
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            self.next_key += 1;
            keys.push(self.next_key);
            self.entries.push(RemoteEntry {
                key: self.next_key,
                record,
            });
        }
        Ok(keys)
    }

    fn entries(&self) -> Result<Vec<RemoteEntry>, CoreError> {
        Ok(self.entries.clone())
    }

    fn len(&self) -> Result<usize, CoreError> {
        Ok(self.entries.len())
    }

    fn remove_at(&mut self, index: usize) -> Result<RemoteEntry, CoreError> {
        if index >= self.entries.len() {
            return Err(CoreError::Range {
                index: index as i64,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    fn remove_key(&mut self, key: u64) -> Result<Option<RemoteEntry>, CoreError> {
        Ok(self
            .entries
            .iter()
            .position(|entry| entry.key == key)
            .map(|index| self.entries.remove(index)))
    }
}

const ENTRIES_DB: &str = "entries";
const META_DB: &str = "meta";
const NEXT_KEY: &[u8] = b"next_key";
const MAP_SIZE: usize = 256 * 1024 * 1024;

/// Durable storage in an LMDB environment.
///
/// Keys are big-endian `u64`, so cursor order is append order and the n-th
/// cursor entry is the n-th position.
pub struct LmdbLog {
    env: Environment,
    entries: Database,
    meta: Database,
    path: PathBuf,
}

impl LmdbLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|e| {
            CoreError::Persistence(format!("cannot create {}: {e}", path.display()))
        })?;

        let env = Environment::new()
            .set_max_dbs(2)
            .set_map_size(MAP_SIZE)
            .open(&path)?;
        let entries = env.create_db(Some(ENTRIES_DB), DatabaseFlags::empty())?;
        let meta = env.create_db(Some(META_DB), DatabaseFlags::empty())?;

        info!("Remote log opened at {}", path.display());
        Ok(Self {
            env,
            entries,
            meta,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(key: &[u8], value: &[u8]) -> Result<RemoteEntry, CoreError> {
        Ok(RemoteEntry {
            key: Self::decode_key(key)?,
            record: serde_json::from_slice(value)?,
        })
    }

    /// Key of the entry at `index`, found by walking the cursor.
    fn key_at(&self, index: usize) -> Result<Option<u64>, CoreError> {
        let txn = self.env.begin_ro_txn()?;
        let found = {
            let mut cursor = txn.open_ro_cursor(self.entries)?;
            cursor.iter_start().nth(index).map(|(key, _)| key.to_vec())
        };
        txn.abort();
        match found {
            Some(key) => Ok(Some(Self::decode_key(&key)?)),
            None => Ok(None),
        }
    }

    fn decode_key(key: &[u8]) -> Result<u64, CoreError> {
        let raw: [u8; 8] = key
            .try_into()
            .map_err(|_| CoreError::Persistence("remote key is corrupted".to_string()))?;
        Ok(u64::from_be_bytes(raw))
    }
}

impl RemoteLog for LmdbLog {
    fn append(&mut self, records: Vec<Map<String, JsonValue>>) -> Result<Vec<u64>, CoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        let mut next = match txn.get(self.meta, &NEXT_KEY) {
            Ok(bytes) => Self::decode_key(bytes)?,
            Err(lmdb::Error::NotFound) => 1,
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::with_capacity(records.len());
        for record in &records {
            let json = serde_json::to_vec(record)?;
            txn.put(
                self.entries,
                &next.to_be_bytes(),
                &json,
                WriteFlags::NO_OVERWRITE,
            )?;
            keys.push(next);
            next += 1;
        }
        txn.put(self.meta, &NEXT_KEY, &next.to_be_bytes(), WriteFlags::empty())?;
        txn.commit()?;
        Ok(keys)
    }

    fn entries(&self) -> Result<Vec<RemoteEntry>, CoreError> {
        let txn = self.env.begin_ro_txn()?;
        let mut out = Vec::new();
        {
            let mut cursor = txn.open_ro_cursor(self.entries)?;
            for (key, value) in cursor.iter_start() {
                match Self::decode(key, value) {
                    Ok(entry) => out.push(entry),
                    Err(e) => {
                        warn!("Unreadable remote entry {:?}: {e}", key);
                        return Err(CoreError::Persistence(format!(
                            "remote entry at position {} is corrupted: {e}",
                            out.len()
                        )));
                    }
                }
            }
        }
        txn.abort();
        Ok(out)
    }

    fn len(&self) -> Result<usize, CoreError> {
        let txn = self.env.begin_ro_txn()?;
        let count = {
            let mut cursor = txn.open_ro_cursor(self.entries)?;
            cursor.iter_start().count()
        };
        txn.abort();
        Ok(count)
    }

    fn remove_at(&mut self, index: usize) -> Result<RemoteEntry, CoreError> {
        let key = match self.key_at(index)? {
            Some(key) => key,
            None => {
                return Err(CoreError::Range {
                    index: index as i64,
                    len: self.len()?,
                })
            }
        };
        self.remove_key(key)?
            .ok_or_else(|| CoreError::NotFound(format!("entry {key} vanished during removal")))
    }

    fn remove_key(&mut self, key: u64) -> Result<Option<RemoteEntry>, CoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        let entry = match txn.get(self.entries, &key.to_be_bytes()) {
            Ok(bytes) => RemoteEntry {
                key,
                record: serde_json::from_slice(bytes)?,
            },
            Err(lmdb::Error::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        txn.del(self.entries, &key.to_be_bytes(), None)?;
        txn.commit()?;
        Ok(Some(entry))
    }
}

/// Outcome of a bulk append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub count: usize,
    /// `true` when an idempotency key matched an earlier batch and nothing
    /// was appended.
    pub replayed: bool,
}

/// Idempotency keys that can still suppress a replay.
pub const DEFAULT_REMEMBERED_BATCHES: usize = 1024;

/// The most recent idempotency keys and the counts they acknowledged.
/// Once full, the oldest key is forgotten; a retry carrying it is appended
/// again.
#[derive(Debug)]
struct BatchMemory {
    counts: HashMap<String, usize>,
    order: VecDeque<String>,
    capacity: usize,
}

impl BatchMemory {
    fn new(capacity: usize) -> Self {
        Self {
            counts: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<usize> {
        self.counts.get(key).copied()
    }

    fn remember(&mut self, key: &str, count: usize) {
        if self.capacity == 0 {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.counts.remove(&oldest);
            }
        }
        self.order.push_back(key.to_string());
        self.counts.insert(key.to_string(), count);
    }
}

/// The remote collection: validation and idempotency on top of a
/// [`RemoteLog`]. Mutations are serialized behind a mutex but carry no
/// concurrency token, so positional deletes from a stale view still remove
/// whatever currently sits at that position.
///
/// Idempotency keys live in process memory only, bounded by
/// [`DEFAULT_REMEMBERED_BATCHES`] unless set with
/// [`with_batch_memory`](Self::with_batch_memory).
pub struct RemoteCollection {
    log: Mutex<Box<dyn RemoteLog>>,
    batches: Mutex<BatchMemory>,
}

impl RemoteCollection {
    pub fn new(log: Box<dyn RemoteLog>) -> Self {
        Self {
            log: Mutex::new(log),
            batches: Mutex::new(BatchMemory::new(DEFAULT_REMEMBERED_BATCHES)),
        }
    }

    /// Remembers at most `capacity` idempotency keys.
    pub fn with_batch_memory(self, capacity: usize) -> Self {
        Self {
            batches: Mutex::new(BatchMemory::new(capacity)),
            ..self
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryLog::new()))
    }

    /// Appends every element of `payload`, which must be a JSON array of
    /// objects. Resubmitting the same payload without an idempotency key
    /// appends it again.
    pub fn bulk_append(
        &self,
        payload: JsonValue,
        idempotency_key: Option<&str>,
    ) -> Result<AppendOutcome, CoreError> {
        let JsonValue::Array(items) = payload else {
            return Err(CoreError::InvalidFormat(
                "Invalid format. Expected an array.".to_string(),
            ));
        };

        let mut records = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            match item {
                JsonValue::Object(object) => records.push(object),
                other => {
                    return Err(CoreError::InvalidFormat(format!(
                        "element {position} is not an object: {other}"
                    )))
                }
            }
        }

        let mut batches = self.batches.lock()?;
        if let Some(key) = idempotency_key {
            if let Some(count) = batches.get(key) {
                info!("Batch {key} already applied ({count} location(s)); not appending again");
                return Ok(AppendOutcome {
                    count,
                    replayed: true,
                });
            }
        }

        let count = records.len();
        self.log.lock()?.append(records)?;
        if let Some(key) = idempotency_key {
            batches.remember(key, count);
        }

        info!("Received {count} new location(s).");
        Ok(AppendOutcome {
            count,
            replayed: false,
        })
    }

    pub fn list(&self) -> Result<Vec<RemoteEntry>, CoreError> {
        self.log.lock()?.entries()
    }

    pub fn len(&self) -> Result<usize, CoreError> {
        self.log.lock()?.len()
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        self.log.lock()?.is_empty()
    }

    /// Removes the entry at a zero-based position. Positions outside
    /// `[0, len)`, negative ones included, leave the collection unchanged.
    pub fn delete_at(&self, index: i64) -> Result<RemoteEntry, CoreError> {
        let mut log = self.log.lock()?;
        let len = log.len()?;
        let position = usize::try_from(index)
            .ok()
            .filter(|&position| position < len)
            .ok_or(CoreError::Range { index, len })?;

        let removed = log.remove_at(position)?;
        info!("Deleted location at index {index}: {}", removed.to_json());
        Ok(removed)
    }

    /// Removes the entry with the given stable key.
    pub fn delete_by_key(&self, key: u64) -> Result<RemoteEntry, CoreError> {
        let removed = self
            .log
            .lock()?
            .remove_key(key)?
            .ok_or_else(|| CoreError::NotFound(format!("no remote location with key {key}")))?;
        info!("Deleted location with key {key}: {}", removed.to_json());
        Ok(removed)
    }
}
