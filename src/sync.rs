//! Bulk transfer of unsynced device records to the remote collection.
//!
//! One run walks `Collecting → Confirming → Transmitting → Acknowledging →
//! Committing` and returns to `Idle`, aborting to `Idle` on decline or
//! failure. The transfer is at-least-once: local records are only marked
//! synced after the remote acknowledged the whole batch, so a lost
//! acknowledgement or a failure while committing causes the affected records
//! to be sent again on the next run.

use std::fmt::{Display, Formatter};

use log::{debug, info, warn};

use crate::client::RemoteApi;
use crate::error::CoreError;
use crate::local_store::RecordStore;
use crate::location_record::{LocationRecord, RecordPatch, WireRecord};
use crate::operator::{Notice, Operator, CONFIRM_TRANSFER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Collecting,
    Confirming,
    Transmitting,
    Acknowledging,
    Committing,
}

impl Display for SyncPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Collecting => "collecting",
            SyncPhase::Confirming => "confirming",
            SyncPhase::Transmitting => "transmitting",
            SyncPhase::Acknowledging => "acknowledging",
            SyncPhase::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No unsynced records; no network call was made.
    NothingToSync,
    /// The operator declined; nothing changed.
    Declined,
    /// Every transmitted record is now marked synced. `records` is the
    /// refreshed local list.
    Synced {
        count: usize,
        records: Vec<LocationRecord>,
    },
}

pub struct SyncCoordinator<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    remote: &'a R,
    idempotent_batches: bool,
    phase: SyncPhase,
}

impl<'a, S, R> SyncCoordinator<'a, S, R>
where
    S: RecordStore + ?Sized,
    R: RemoteApi + ?Sized,
{
    pub fn new(store: &'a S, remote: &'a R) -> Self {
        Self {
            store,
            remote,
            idempotent_batches: false,
            phase: SyncPhase::Idle,
        }
    }

    /// Attach a batch idempotency key derived from the batch contents.
    pub fn with_idempotent_batches(mut self, enabled: bool) -> Self {
        self.idempotent_batches = enabled;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("Sync phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Runs one sync. Failures are logged, reported to the operator and
    /// returned; the coordinator is back in `Idle` either way.
    pub fn run<O: Operator + ?Sized>(&mut self, operator: &O) -> Result<SyncOutcome, CoreError> {
        let result = self.drive(operator);
        match &result {
            Ok(SyncOutcome::NothingToSync) => operator.notify(Notice::NothingToSync),
            Ok(SyncOutcome::Synced { count, .. }) => operator.notify(Notice::Synced(*count)),
            Ok(SyncOutcome::Declined) => info!("Sync declined by operator"),
            Err(e) => {
                warn!("Sync failed during {}: {e}", self.phase);
                operator.notify(Notice::SyncFailed(e.to_string()));
            }
        }
        self.enter(SyncPhase::Idle);
        result
    }

    fn drive<O: Operator + ?Sized>(&mut self, operator: &O) -> Result<SyncOutcome, CoreError> {
        self.enter(SyncPhase::Collecting);
        let unsynced: Vec<LocationRecord> = self
            .store
            .list()?
            .into_iter()
            .filter(|record| !record.synced)
            .collect();
        if unsynced.is_empty() {
            return Ok(SyncOutcome::NothingToSync);
        }

        self.enter(SyncPhase::Confirming);
        if !operator.confirm(CONFIRM_TRANSFER) {
            return Ok(SyncOutcome::Declined);
        }

        self.enter(SyncPhase::Transmitting);
        let batch: Vec<WireRecord> = unsynced.iter().map(LocationRecord::to_wire).collect();
        let key = if self.idempotent_batches {
            Some(batch_key(&batch)?)
        } else {
            None
        };
        let sent = self.remote.bulk_append(&batch, key.as_deref());

        self.enter(SyncPhase::Acknowledging);
        let acknowledged = sent?;
        if acknowledged != batch.len() {
            return Err(CoreError::Network(format!(
                "remote acknowledged {acknowledged} of {} location(s)",
                batch.len()
            )));
        }

        self.enter(SyncPhase::Committing);
        let total = unsynced.len();
        for (committed, record) in unsynced.iter().enumerate() {
            if let Err(e) = self.store.update(record.id, RecordPatch::mark_synced()) {
                return Err(CoreError::PartialCommit {
                    committed,
                    total,
                    reason: e.to_string(),
                });
            }
        }

        info!("{total} location(s) synced");
        Ok(SyncOutcome::Synced {
            count: total,
            records: self.store.list()?,
        })
    }
}

/// Content-derived key: an identical retry of the same batch produces the
/// same key.
pub fn batch_key(batch: &[WireRecord]) -> Result<String, CoreError> {
    let bytes = serde_json::to_vec(batch)?;
    Ok(format!("batch-{}", blake3::hash(&bytes).to_hex()))
}
