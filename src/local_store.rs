//! Durable on-device record store backed by LMDB.
//!
//! Records live in the `records` database keyed by their id encoded as a
//! big-endian `u64`, so a cursor walk returns them in insertion order. The
//! next id to hand out is kept in the `meta` database and is advanced in the
//! same write transaction as the insert, which makes ids strictly increasing
//! and never reused, even after deletes or a `clear`.

use std::path::{Path, PathBuf};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};

use crate::error::CoreError;
use crate::location_record::{CapturedLocation, LocationRecord, RecordPatch};

const RECORDS_DB: &str = "records";
const META_DB: &str = "meta";
const NEXT_ID_KEY: &[u8] = b"next_id";
const MAP_SIZE: usize = 64 * 1024 * 1024;

/// The four operations the coordinators need from the device store.
///
/// [`LocalStore`] is the production implementation.
pub trait RecordStore {
    /// Persists a new record with `synced = false` and returns its fresh id.
    fn add(&self, location: CapturedLocation) -> Result<u64, CoreError>;

    /// All records in insertion order, read from storage. A record that
    /// cannot be decoded fails the whole listing with `Persistence`.
    fn list(&self) -> Result<Vec<LocationRecord>, CoreError>;

    /// Merges `patch` into the record with `id`.
    fn update(&self, id: u64, patch: RecordPatch) -> Result<LocationRecord, CoreError>;

    /// Removes the record with `id` permanently.
    fn delete(&self, id: u64) -> Result<(), CoreError>;
}

pub struct LocalStore {
    env: Environment,
    records: Database,
    meta: Database,
    path: PathBuf,
}

impl LocalStore {
    /// Opens (or creates) the store in the directory `<name>.lmdb`.
    pub fn init(name: impl AsRef<Path>) -> Result<Self, CoreError> {
        let mut dir = name.as_ref().as_os_str().to_owned();
        dir.push(".lmdb");
        Self::open_dir(PathBuf::from(dir))
    }

    fn open_dir(path: PathBuf) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&path).map_err(|e| {
            CoreError::Persistence(format!("cannot create {}: {e}", path.display()))
        })?;

        let env = Environment::new()
            .set_max_dbs(2)
            .set_map_size(MAP_SIZE)
            .open(&path)?;
        let records = env.create_db(Some(RECORDS_DB), DatabaseFlags::empty())?;
        let meta = env.create_db(Some(META_DB), DatabaseFlags::empty())?;

        info!("Local store opened at {}", path.display());
        Ok(Self {
            env,
            records,
            meta,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: u64) -> Result<Option<LocationRecord>, CoreError> {
        let txn = self.env.begin_ro_txn()?;
        let record = match txn.get(self.records, &id.to_be_bytes()) {
            Ok(bytes) => Some(serde_json::from_slice(bytes)?),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(record)
    }

    /// Records that have not been acknowledged by the remote yet.
    pub fn unsynced(&self) -> Result<Vec<LocationRecord>, CoreError> {
        Ok(self.list()?.into_iter().filter(|r| !r.synced).collect())
    }

    /// Removes every record. The id counter is kept so ids are not reused.
    pub fn clear(&self) -> Result<usize, CoreError> {
        let count = self.list()?.len();
        let mut txn = self.env.begin_rw_txn()?;
        txn.clear_db(self.records)?;
        txn.commit()?;
        info!("Cleared {count} local record(s)");
        Ok(count)
    }

    /// Flushes and releases the environment.
    pub fn close(self) -> Result<(), CoreError> {
        self.env.sync(true)?;
        info!("Local store at {} closed", self.path.display());
        Ok(())
    }
}

impl RecordStore for LocalStore {
    fn add(&self, location: CapturedLocation) -> Result<u64, CoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        let id = match txn.get(self.meta, &NEXT_ID_KEY) {
            Ok(bytes) => decode_id(bytes)?,
            Err(lmdb::Error::NotFound) => 1,
            Err(e) => return Err(e.into()),
        };

        let record = location.into_record(id);
        let json = serde_json::to_vec(&record)?;
        txn.put(
            self.records,
            &id.to_be_bytes(),
            &json,
            WriteFlags::NO_OVERWRITE,
        )?;
        txn.put(
            self.meta,
            &NEXT_ID_KEY,
            &(id + 1).to_be_bytes(),
            WriteFlags::empty(),
        )?;
        txn.commit()?;

        debug!("Stored record {id} ({})", record.name);
        Ok(id)
    }

    fn list(&self) -> Result<Vec<LocationRecord>, CoreError> {
        let txn = self.env.begin_ro_txn()?;
        let mut records = Vec::new();
        {
            let mut cursor = txn.open_ro_cursor(self.records)?;
            for (key, value) in cursor.iter_start() {
                match serde_json::from_slice::<LocationRecord>(value) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!("Unreadable record {:?}: {e}", key);
                        return Err(CoreError::Persistence(format!(
                            "record {} is corrupted: {e}",
                            decode_id(key).map_or_else(|_| format!("{key:?}"), |id| id.to_string())
                        )));
                    }
                }
            }
        }
        txn.abort();
        Ok(records)
    }

    fn update(&self, id: u64, patch: RecordPatch) -> Result<LocationRecord, CoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        let mut record: LocationRecord = match txn.get(self.records, &id.to_be_bytes()) {
            Ok(bytes) => serde_json::from_slice(bytes)?,
            Err(lmdb::Error::NotFound) => {
                return Err(CoreError::NotFound(format!("no local record with id {id}")))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(synced) = patch.synced {
            if record.synced && !synced {
                return Err(CoreError::Validation(format!(
                    "record {id} is already synced; the flag cannot be cleared"
                )));
            }
            record.synced = synced;
        }

        let json = serde_json::to_vec(&record)?;
        txn.put(self.records, &id.to_be_bytes(), &json, WriteFlags::empty())?;
        txn.commit()?;
        Ok(record)
    }

    fn delete(&self, id: u64) -> Result<(), CoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.records, &id.to_be_bytes(), None) {
            Ok(()) => {
                txn.commit()?;
                info!("Deleted local record {id}");
                Ok(())
            }
            Err(lmdb::Error::NotFound) => {
                Err(CoreError::NotFound(format!("no local record with id {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decode_id(bytes: &[u8]) -> Result<u64, CoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoreError::Persistence("id counter is corrupted".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant_raw(store: &LocalStore, id: u64, bytes: &[u8]) {
        let mut txn = store.env.begin_rw_txn().unwrap();
        txn.put(store.records, &id.to_be_bytes(), &bytes, WriteFlags::empty())
            .unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn corrupted_record_is_reported_not_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::init(dir.path().join("corrupt")).unwrap();
        store
            .add(CapturedLocation::now("A", Some(1.0), Some(2.0)))
            .unwrap();
        plant_raw(&store, 2, b"{not json");

        let err = store.list().unwrap_err();
        assert!(matches!(err, CoreError::Persistence(_)), "{err}");
        assert!(matches!(store.unsynced(), Err(CoreError::Persistence(_))));
    }
}
