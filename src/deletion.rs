//! Deleting from one store at a time.
//!
//! A local delete never reaches the remote collection and a remote delete
//! never touches the device, even for a record that exists in both.

use log::{info, warn};

use crate::client::RemoteApi;
use crate::error::CoreError;
use crate::local_store::RecordStore;
use crate::location_record::{LocationRecord, RemoteRecord};
use crate::operator::{Notice, Operator, CONFIRM_LOCAL_DELETE, CONFIRM_REMOTE_DELETE};

/// Which remote record to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteTarget {
    /// The stable key assigned when the record was appended.
    Key(u64),
    /// A position in a previously fetched list. Wrong as soon as anyone
    /// else appended or deleted in between.
    Position(i64),
}

/// Deletes the local record `id` after confirmation and returns the
/// refreshed local list, or `None` if the operator declined.
pub fn delete_local<S, O>(
    store: &S,
    id: u64,
    operator: &O,
) -> Result<Option<Vec<LocationRecord>>, CoreError>
where
    S: RecordStore + ?Sized,
    O: Operator + ?Sized,
{
    if !operator.confirm(CONFIRM_LOCAL_DELETE) {
        return Ok(None);
    }

    let refreshed = store.delete(id).and_then(|()| store.list());
    match refreshed {
        Ok(records) => {
            info!("Local record {id} deleted");
            operator.notify(Notice::LocalDeleted);
            Ok(Some(records))
        }
        Err(e) => {
            warn!("Failed to delete location {id}: {e}");
            operator.notify(Notice::LocalDeleteFailed(e.to_string()));
            Err(e)
        }
    }
}

/// Deletes one remote record after confirmation and returns the refetched
/// remote list, or `None` if the operator declined.
pub fn delete_remote<R, O>(
    remote: &R,
    target: RemoteTarget,
    operator: &O,
) -> Result<Option<Vec<RemoteRecord>>, CoreError>
where
    R: RemoteApi + ?Sized,
    O: Operator + ?Sized,
{
    if !operator.confirm(CONFIRM_REMOTE_DELETE) {
        return Ok(None);
    }

    let removed = match target {
        RemoteTarget::Key(key) => remote.delete_by_key(key),
        RemoteTarget::Position(index) => remote.delete_at(index),
    };
    match removed.and_then(|removed| remote.list().map(|list| (removed, list))) {
        Ok((removed, records)) => {
            info!("Remote location {:?} ({}) deleted", target, removed.name);
            operator.notify(Notice::RemoteDeleted);
            Ok(Some(records))
        }
        Err(e) => {
            warn!("Delete failed: {e}");
            operator.notify(Notice::RemoteDeleteFailed(e.to_string()));
            Err(e)
        }
    }
}
