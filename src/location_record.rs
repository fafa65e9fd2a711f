//! Data model for captured locations.
//!
//! A record exists in up to two places: the device store, where it carries a
//! device-assigned [`LocationRecord::id`], and the remote collection, where it
//! is a [`RemoteRecord`] identified by a server-assigned key. What travels
//! between the two is a [`WireRecord`], which carries no id at all.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A location as it exists on the device.
///
/// The record is immutable once stored except for [`synced`](Self::synced),
/// which only ever moves from `false` to `true`.
///
/// ```rust
/// use field_capture_sync::location_record::LocationRecord;
///
/// let json = r#"{"id":7,"name":"House 12","lat":24.8607,"lng":67.0011,
///               "timestamp":"2024-01-15T10:30:00.000Z","synced":false}"#;
/// let record: LocationRecord = serde_json::from_str(json)?;
/// assert_eq!(record.id, 7);
/// assert!(!record.synced);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LocationRecord {
    /// Auto-increment id, unique for the lifetime of the device store and
    /// never reused after deletion.
    pub id: u64,

    /// Person or house label entered by the operator.
    pub name: String,

    /// Latitude in degrees; `None` when the fix did not provide one.
    pub lat: Option<f64>,

    /// Longitude in degrees; `None` when the fix did not provide one.
    pub lng: Option<f64>,

    /// Capture time, ISO-8601 UTC.
    pub timestamp: String,

    /// Whether a bulk transfer containing this record was acknowledged.
    pub synced: bool,
}

impl LocationRecord {
    /// The copy of this record that is sent to the remote collection.
    pub fn to_wire(&self) -> WireRecord {
        WireRecord {
            name: self.name.clone(),
            lat: self.lat,
            lng: self.lng,
            timestamp: self.timestamp.clone(),
            synced: self.synced,
        }
    }
}

/// A freshly captured location that has not been given an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedLocation {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub timestamp: String,
}

impl CapturedLocation {
    /// Builds a capture stamped with the current UTC time.
    pub fn now(name: impl Into<String>, lat: Option<f64>, lng: Option<f64>) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            timestamp: capture_timestamp(),
        }
    }

    pub(crate) fn into_record(self, id: u64) -> LocationRecord {
        LocationRecord {
            id,
            name: self.name,
            lat: self.lat,
            lng: self.lng,
            timestamp: self.timestamp,
            synced: false,
        }
    }
}

/// Fields that may be merged into a stored record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced: Option<bool>,
}

impl RecordPatch {
    pub fn mark_synced() -> Self {
        Self { synced: Some(true) }
    }
}

/// The transmitted form of a record: `{name, lat, lng, timestamp, synced}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WireRecord {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub timestamp: String,
    pub synced: bool,
}

/// A record as listed by the remote collection.
///
/// `key` is assigned by the server at append time and survives deletions of
/// other records, unlike the record's position in the list. The collection
/// stores whatever objects were submitted, so records are read with
/// [`RemoteRecord::from_json`], which tolerates missing, null and mistyped
/// fields.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RemoteRecord {
    pub key: Option<u64>,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub timestamp: String,
    pub synced: bool,
}

impl RemoteRecord {
    /// Reads one listed element. Returns `None` unless it is a JSON object;
    /// inside an object any field that is absent or of the wrong type falls
    /// back to its empty value.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let object = value.as_object()?;
        let text = |field: &str| {
            object
                .get(field)
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            key: object.get("key").and_then(JsonValue::as_u64),
            name: text("name"),
            lat: object.get("lat").and_then(JsonValue::as_f64),
            lng: object.get("lng").and_then(JsonValue::as_f64),
            timestamp: text("timestamp"),
            synced: object
                .get("synced")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false),
        })
    }
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g.
/// `2024-01-15T10:30:00.000Z`.
pub fn capture_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_copy_drops_the_local_id() {
        let record = CapturedLocation::now("A", Some(1.5), None).into_record(3);
        let wire = serde_json::to_value(record.to_wire()).unwrap();

        assert!(wire.get("id").is_none());
        assert_eq!(wire["name"], "A");
        assert_eq!(wire["lat"], 1.5);
        assert!(wire["lng"].is_null());
        assert_eq!(wire["synced"], false);
    }

    #[test]
    fn capture_timestamp_is_utc_millis() {
        let ts = capture_timestamp();
        assert!(ts.ends_with('Z'), "{ts}");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        // 2024-01-15T10:30:00.000Z
        assert_eq!(ts.len(), 24);
    }

    #[test]
    fn remote_record_tolerates_missing_fields() {
        let remote = RemoteRecord::from_json(&serde_json::json!({"name": "B"})).unwrap();
        assert_eq!(remote.key, None);
        assert_eq!(remote.lat, None);
        assert!(!remote.synced);
    }

    #[test]
    fn remote_record_tolerates_null_and_mistyped_fields() {
        let value = serde_json::json!({
            "key": 9,
            "name": null,
            "lat": "north",
            "lng": 3.5,
            "timestamp": 17,
            "synced": "yes"
        });
        let remote = RemoteRecord::from_json(&value).unwrap();
        assert_eq!(remote.key, Some(9));
        assert_eq!(remote.name, "");
        assert_eq!(remote.lat, None);
        assert_eq!(remote.lng, Some(3.5));
        assert_eq!(remote.timestamp, "");
        assert!(!remote.synced);

        assert!(RemoteRecord::from_json(&serde_json::json!(42)).is_none());
    }
}
