//! Capture: one location fix plus an operator label becomes one unsynced
//! record in the device store.

use log::{info, warn};

use crate::error::CoreError;
use crate::local_store::RecordStore;
use crate::location_record::{CapturedLocation, LocationRecord};
use crate::operator::{Notice, Operator};

/// A single position reading from the platform location service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Fix {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
        }
    }
}

/// Platform location collaborator.
///
/// The call blocks until the service answers; no timeout is applied here.
pub trait LocationSource {
    fn current_fix(&self) -> Result<Fix, CoreError>;
}

/// A source that always reports the same reading, used when the host has
/// already obtained the fix.
#[derive(Debug, Clone, Copy)]
pub struct KnownFix(pub Fix);

impl LocationSource for KnownFix {
    fn current_fix(&self) -> Result<Fix, CoreError> {
        Ok(self.0)
    }
}

/// Captures one record. Only the device store is written.
pub fn capture<S, L, O>(
    store: &S,
    name: &str,
    source: &L,
    operator: &O,
) -> Result<LocationRecord, CoreError>
where
    S: RecordStore + ?Sized,
    L: LocationSource + ?Sized,
    O: Operator + ?Sized,
{
    if name.trim().is_empty() {
        operator.notify(Notice::NameRequired);
        return Err(CoreError::Validation("name must not be empty".to_string()));
    }

    let fix = match source.current_fix() {
        Ok(fix) => fix,
        Err(e) => {
            warn!("Location fix failed: {e}");
            let reason = match &e {
                CoreError::Location(reason) => reason.clone(),
                other => other.to_string(),
            };
            operator.notify(Notice::LocationFailed(reason));
            return Err(e);
        }
    };

    let location = CapturedLocation::now(name, fix.lat, fix.lng);
    let stored = store.add(location.clone()).map_err(|e| {
        warn!("Error capturing location: {e}");
        operator.notify(Notice::CaptureFailed(e.to_string()));
        e
    })?;

    info!("Captured location {stored} for {name}");
    operator.notify(Notice::Captured {
        name: location.name.clone(),
        lat: location.lat,
        lng: location.lng,
    });
    Ok(location.into_record(stored))
}
