//! Shapes the renderer consumes: rows for the captured-data list and markers
//! for the map of synced locations.

use std::fmt::{Display, Formatter};

use log::warn;
use serde::Serialize;

use crate::client::RemoteApi;
use crate::error::CoreError;
use crate::location_record::{LocationRecord, RemoteRecord};
use crate::operator::{Notice, Operator};

/// Four decimals, or `N/A` when the fix did not carry the coordinate.
pub fn format_coordinate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "N/A".to_string(),
    }
}

/// One entry of the captured-data list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalRow {
    pub id: u64,
    pub name: String,
    pub lat: String,
    pub lng: String,
    pub synced: bool,
}

impl From<&LocationRecord> for LocalRow {
    fn from(record: &LocationRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            lat: format_coordinate(record.lat),
            lng: format_coordinate(record.lng),
            synced: record.synced,
        }
    }
}

impl Display for LocalRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\nLat: {}, Lng: {}\n{}",
            self.name,
            self.lat,
            self.lng,
            if self.synced { "Synced" } else { "Not Synced" }
        )
    }
}

pub fn local_rows(records: &[LocationRecord]) -> Vec<LocalRow> {
    records.iter().map(LocalRow::from).collect()
}

/// A plottable remote record.
///
/// `position` is only valid for the list the marker was built from; `key`
/// stays valid until the record itself is deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub position: usize,
    pub key: Option<u64>,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Markers for every remote record that has both coordinates.
pub fn map_markers(records: &[RemoteRecord]) -> Vec<MapMarker> {
    records
        .iter()
        .enumerate()
        .filter_map(|(position, record)| match (record.lat, record.lng) {
            (Some(lat), Some(lng)) => Some(MapMarker {
                position,
                key: record.key,
                name: record.name.clone(),
                lat,
                lng,
            }),
            _ => None,
        })
        .collect()
}

/// Where to centre the map: the first plottable record, or `None` while
/// there is nothing to show yet.
pub fn map_center(records: &[RemoteRecord]) -> Option<(f64, f64)> {
    map_markers(records).first().map(|m| (m.lat, m.lng))
}

/// Fetches the remote list the map is drawn from. The map never reads the
/// device store.
pub fn load_remote<R, O>(remote: &R, operator: &O) -> Result<Vec<RemoteRecord>, CoreError>
where
    R: RemoteApi + ?Sized,
    O: Operator + ?Sized,
{
    remote.list().map_err(|e| {
        warn!("Error fetching locations: {e}");
        operator.notify(Notice::RemoteLoadFailed(e.to_string()));
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(key: u64, name: &str, lat: Option<f64>, lng: Option<f64>) -> RemoteRecord {
        RemoteRecord {
            key: Some(key),
            name: name.to_string(),
            lat,
            lng,
            timestamp: "2024-01-15T10:30:00.000Z".to_string(),
            synced: false,
        }
    }

    #[test]
    fn coordinates_render_with_four_decimals() {
        assert_eq!(format_coordinate(Some(24.860734)), "24.8607");
        assert_eq!(format_coordinate(Some(0.0)), "0.0000");
        assert_eq!(format_coordinate(None), "N/A");
    }

    #[test]
    fn local_row_shows_sync_state() {
        let record = LocationRecord {
            id: 4,
            name: "House 9".to_string(),
            lat: Some(1.0),
            lng: None,
            timestamp: "2024-01-15T10:30:00.000Z".to_string(),
            synced: true,
        };
        let row = LocalRow::from(&record);
        assert_eq!(row.to_string(), "House 9\nLat: 1.0000, Lng: N/A\nSynced");
    }

    #[test]
    fn markers_skip_records_without_coordinates() {
        let records = vec![
            remote(1, "A", None, Some(2.0)),
            remote(2, "B", Some(3.0), Some(4.0)),
            remote(3, "C", Some(5.0), Some(6.0)),
        ];
        let markers = map_markers(&records);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].position, 1);
        assert_eq!(markers[0].key, Some(2));
        assert_eq!(map_center(&records), Some((3.0, 4.0)));
    }

    #[test]
    fn no_center_for_empty_map() {
        assert_eq!(map_center(&[]), None);
    }
}
