//! Everything one device needs: its local store and the way to reach the
//! remote collection. The FFI functions in the crate root hold one of these
//! behind a raw pointer.

use std::path::Path;

use log::info;

use crate::capture::{self, LocationSource};
use crate::client::{HttpRemote, RemoteApi};
use crate::config::SyncConfig;
use crate::deletion::{self, RemoteTarget};
use crate::error::CoreError;
use crate::local_store::{LocalStore, RecordStore};
use crate::location_record::{LocationRecord, RemoteRecord};
use crate::operator::Operator;
use crate::sync::{SyncCoordinator, SyncOutcome};
use crate::view;

pub struct DeviceState<R = HttpRemote> {
    store: LocalStore,
    remote: R,
    config: SyncConfig,
}

impl DeviceState<HttpRemote> {
    /// Opens the store `<name>.lmdb` and an HTTP client for `config`.
    pub fn init(name: impl AsRef<Path>, config: SyncConfig) -> Result<Self, CoreError> {
        let remote = HttpRemote::from_config(&config)?;
        let store = LocalStore::init(name)?;
        info!("Device ready; syncing to {}", remote.base_url());
        Ok(Self {
            store,
            remote,
            config,
        })
    }
}

impl<R: RemoteApi> DeviceState<R> {
    pub fn with_remote(store: LocalStore, remote: R, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn capture<L, O>(
        &self,
        name: &str,
        source: &L,
        operator: &O,
    ) -> Result<LocationRecord, CoreError>
    where
        L: LocationSource + ?Sized,
        O: Operator + ?Sized,
    {
        capture::capture(&self.store, name, source, operator)
    }

    pub fn local_records(&self) -> Result<Vec<LocationRecord>, CoreError> {
        self.store.list()
    }

    pub fn sync<O: Operator + ?Sized>(&self, operator: &O) -> Result<SyncOutcome, CoreError> {
        SyncCoordinator::new(&self.store, &self.remote)
            .with_idempotent_batches(self.config.idempotent_batches)
            .run(operator)
    }

    pub fn delete_local<O: Operator + ?Sized>(
        &self,
        id: u64,
        operator: &O,
    ) -> Result<Option<Vec<LocationRecord>>, CoreError> {
        deletion::delete_local(&self.store, id, operator)
    }

    pub fn remote_records<O: Operator + ?Sized>(
        &self,
        operator: &O,
    ) -> Result<Vec<RemoteRecord>, CoreError> {
        view::load_remote(&self.remote, operator)
    }

    pub fn delete_remote<O: Operator + ?Sized>(
        &self,
        target: RemoteTarget,
        operator: &O,
    ) -> Result<Option<Vec<RemoteRecord>>, CoreError> {
        deletion::delete_remote(&self.remote, target, operator)
    }

    pub fn clear_local(&self) -> Result<usize, CoreError> {
        self.store.clear()
    }

    pub fn close(self) -> Result<(), CoreError> {
        self.store.close()
    }
}
