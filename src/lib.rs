//! # Field Capture Sync
//!
//! Offline-first capture of geotagged field records. A device keeps every
//! captured location in a local LMDB store and later pushes the unsynced ones
//! to a shared remote collection in a single batch. The remote collection is
//! served over HTTP by the `location-server` binary.
//!
//! ## Lifecycle of a record
//!
//! - **Capture** writes to the device store only, with `synced = false`.
//! - **Sync** sends every unsynced record in one batch and marks them synced
//!   only after the remote acknowledged the whole batch (at-least-once).
//! - **Delete** acts on the device store or on the remote collection, never
//!   on both.
//!
//! ## Quick Start
//!
//! ```no_run
//! use field_capture_sync::capture::{Fix, KnownFix};
//! use field_capture_sync::config::SyncConfig;
//! use field_capture_sync::device_state::DeviceState;
//! use field_capture_sync::operator::ScriptedOperator;
//!
//! let device = DeviceState::init("field_device", SyncConfig::from_env()?)?;
//! let operator = ScriptedOperator::accepting();
//!
//! device.capture("House 12", &KnownFix(Fix::new(24.8607, 67.0011)), &operator)?;
//! device.sync(&operator)?;
//! # Ok::<(), field_capture_sync::error::CoreError>(())
//! ```
//!
//! ## FFI Functions
//!
//! Host applications (mobile shells) drive the device through C-compatible
//! functions. Each returns a JSON [`AppResponse`](app_response::AppResponse)
//! string that must be released with [`free_response`]:
//!
//! - [`create_store`] - Open the device store and remote client
//! - [`capture_location`] - Store a location the host already obtained
//! - [`get_local_records`] - List device records
//! - [`sync_records`] - Push unsynced records to the remote collection
//! - [`delete_local_record`] - Delete a device record
//! - [`get_remote_records`] - List remote records with map markers
//! - [`delete_remote_record`] - Delete a remote record by its key
//! - [`clear_local_records`] - Remove every device record
//! - [`close_store`] - Release the device

pub mod app_response;
pub mod capture;
pub mod client;
pub mod config;
pub mod deletion;
pub mod device_state;
pub mod error;
pub mod local_store;
pub mod location_record;
pub mod operator;
pub mod remote_store;
pub mod server;
pub mod sync;
pub mod view;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::capture::{Fix, KnownFix};
use crate::config::SyncConfig;
use crate::deletion::RemoteTarget;
use crate::device_state::DeviceState;
use crate::location_record::{LocationRecord, RemoteRecord};
use crate::operator::ScriptedOperator;
use crate::sync::SyncOutcome;
use crate::view::{LocalRow, MapMarker};

/// Payload of a successful FFI call: the notice to show and the data to render.
#[derive(Debug, Serialize)]
struct FfiPayload<T: Serialize> {
    notice: Option<String>,
    data: T,
}

#[derive(Debug, Deserialize)]
struct CaptureRequest {
    name: String,
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    outcome: &'static str,
    count: usize,
    records: Vec<LocationRecord>,
}

#[derive(Debug, Serialize)]
struct RemoteView {
    records: Vec<RemoteRecord>,
    markers: Vec<MapMarker>,
    center: Option<(f64, f64)>,
}

impl RemoteView {
    fn new(records: Vec<RemoteRecord>) -> Self {
        Self {
            markers: view::map_markers(&records),
            center: view::map_center(&records),
            records,
        }
    }
}

/// Opens the device store `<name>.lmdb` and a client for the remote collection.
///
/// # Parameters
///
/// * `name` - Null-terminated store name
/// * `server_url` - Null-terminated base URL of the remote collection, or
///   null to read `FIELD_SYNC_URL` and related settings from the environment
///
/// # Returns
///
/// A pointer to the [`DeviceState`], or null on failure. Release it with
/// [`close_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use field_capture_sync::create_store;
///
/// let name = CString::new("field_device").unwrap();
/// let url = CString::new("http://localhost:5000").unwrap();
/// let device = create_store(name.as_ptr(), url.as_ptr());
/// assert!(!device.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char, server_url: *const c_char) -> *mut DeviceState {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s.to_string(),
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = if server_url.is_null() {
        match SyncConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid sync configuration: {e}");
                return std::ptr::null_mut();
            }
        }
    } else {
        match unsafe { CStr::from_ptr(server_url).to_str() } {
            Ok(url) => SyncConfig::with_server_url(url),
            Err(e) => {
                warn!("Invalid UTF-8 in server_url parameter: {e}");
                return std::ptr::null_mut();
            }
        }
    };

    match DeviceState::init(&name_str, config) {
        Ok(device) => {
            info!("Device store {name_str} initialized");
            Box::into_raw(Box::new(device))
        }
        Err(e) => {
            warn!("Failed to initialize device store {name_str}: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Stores a location fix the host obtained from the platform.
///
/// Expected JSON: `{"name": "House 12", "lat": 24.8607, "lng": 67.0011}`;
/// `lat`/`lng` may be null. Returns the stored record.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn capture_location(state: *mut DeviceState, json_ptr: *const c_char) -> *const c_char {
    let device = match device_ref(state, "capture_location") {
        Ok(device) => device,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let request: CaptureRequest = match serde_json::from_str(&json_str) {
        Ok(request) => request,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let operator = ScriptedOperator::accepting();
    let source = KnownFix(Fix {
        lat: request.lat,
        lng: request.lng,
    });
    let result = device.capture(&request.name, &source, &operator);
    respond(result, &operator)
}

/// Lists every device record in capture order, with display rows.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_local_records(state: *mut DeviceState) -> *const c_char {
    let device = match device_ref(state, "get_local_records") {
        Ok(device) => device,
        Err(err) => return err,
    };

    match device.local_records() {
        Ok(records) => {
            let rows: Vec<LocalRow> = view::local_rows(&records);
            let payload = FfiPayload {
                notice: None,
                data: serde_json::json!({ "records": records, "rows": rows }),
            };
            response_to_c_string(&AppResponse::json(&payload))
        }
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Sends every unsynced record to the remote collection.
///
/// # Parameters
///
/// * `state` - Pointer to the device
/// * `confirmed` - Whether the operator confirmed the transfer. With
///   `false` nothing is sent and nothing changes.
///
/// # Returns
///
/// `Ok` with `{"outcome": "nothing_to_sync" | "declined" | "synced", ...}`,
/// or an error response. On a network error no record changes; retrying
/// sends the same records again.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn sync_records(state: *mut DeviceState, confirmed: bool) -> *const c_char {
    let device = match device_ref(state, "sync_records") {
        Ok(device) => device,
        Err(err) => return err,
    };

    let operator = ScriptedOperator::answering(confirmed);
    let result = device.sync(&operator).map(|outcome| match outcome {
        SyncOutcome::NothingToSync => SyncReport {
            outcome: "nothing_to_sync",
            count: 0,
            records: Vec::new(),
        },
        SyncOutcome::Declined => SyncReport {
            outcome: "declined",
            count: 0,
            records: Vec::new(),
        },
        SyncOutcome::Synced { count, records } => SyncReport {
            outcome: "synced",
            count,
            records,
        },
    });
    respond(result, &operator)
}

/// Deletes one device record. The remote copy, if any, is left alone.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_local_record(state: *mut DeviceState, id: u64, confirmed: bool) -> *const c_char {
    let device = match device_ref(state, "delete_local_record") {
        Ok(device) => device,
        Err(err) => return err,
    };

    let operator = ScriptedOperator::answering(confirmed);
    let result = device.delete_local(id, &operator);
    respond(result, &operator)
}

/// Lists the remote collection with map markers and the map centre.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_remote_records(state: *mut DeviceState) -> *const c_char {
    let device = match device_ref(state, "get_remote_records") {
        Ok(device) => device,
        Err(err) => return err,
    };

    let operator = ScriptedOperator::accepting();
    let result = device.remote_records(&operator).map(RemoteView::new);
    respond(result, &operator)
}

/// Deletes one remote record by the key it was given at append time.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_remote_record(state: *mut DeviceState, key: u64, confirmed: bool) -> *const c_char {
    let device = match device_ref(state, "delete_remote_record") {
        Ok(device) => device,
        Err(err) => return err,
    };

    let operator = ScriptedOperator::answering(confirmed);
    let result = device
        .delete_remote(RemoteTarget::Key(key), &operator)
        .map(|refreshed| refreshed.map(RemoteView::new));
    respond(result, &operator)
}

/// Removes every device record. Ids keep increasing afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_local_records(state: *mut DeviceState) -> *const c_char {
    let device = match device_ref(state, "clear_local_records") {
        Ok(device) => device,
        Err(err) => return err,
    };

    match device.clear_local() {
        Ok(count) => response_to_c_string(&AppResponse::success(format!(
            "{count} record(s) cleared"
        ))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Flushes the store and frees the device. The pointer must not be used
/// afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut DeviceState) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let device = unsafe { Box::from_raw(state) };
    match device.close() {
        Ok(()) => response_to_c_string(&AppResponse::success("Device store closed successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Releases a string returned by any of the functions above.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn device_ref<'a>(state: *mut DeviceState, caller: &str) -> Result<&'a DeviceState, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(device) => Ok(device),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Turns an operation result plus the notices it raised into a response.
fn respond<T: Serialize>(
    result: Result<T, error::CoreError>,
    operator: &ScriptedOperator,
) -> *const c_char {
    let notice = operator.last_notice().map(|notice| notice.to_string());
    let response = match result {
        Ok(data) => AppResponse::json(&FfiPayload { notice, data }),
        Err(e) => AppResponse::from(e),
    };
    response_to_c_string(&response)
}

/// Serializes a response into a C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust `String`, reporting null pointers
/// and invalid UTF-8 as a `BadRequest` response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
