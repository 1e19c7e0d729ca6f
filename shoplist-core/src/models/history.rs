//! Archived shopping trips.
//!
//! Completing a trip creates one `shopping_history` record and one
//! `shopping_history_items` snapshot per item that was on the list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::shopping_item::{NewItem, ShoppingItem};
use crate::store::{Record, StoreError};

/// Progress of a trip archive.
///
/// A record stays `Archiving` until the active items it snapshotted have been
/// removed from the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    #[default]
    Archiving,
    Complete,
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStatus::Archiving => "archiving",
            ArchiveStatus::Complete => "complete",
        }
    }
}

/// A completed trip as stored in `shopping_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub status: ArchiveStatus,
    pub completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(record)).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Snapshot of a single item taken when its trip was completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub history_id: String,
    /// Id of the active item this was copied from
    pub source_item_id: Option<String>,
    pub name: String,
    pub unit: String,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(record)).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Fields for the snapshot insert of `item` under trip `history_id`.
    pub fn snapshot_record(history_id: &str, item: &ShoppingItem) -> Record {
        let mut record = Record::new();
        record.insert("history_id".into(), Value::from(history_id));
        record.insert("source_item_id".into(), Value::from(item.id.clone()));
        record.insert("name".into(), Value::from(item.name.clone()));
        record.insert("unit".into(), Value::from(item.unit.clone()));
        record.insert("quantity".into(), Value::from(item.quantity));
        record.insert(
            "image_url".into(),
            item.image_url.clone().map(Value::from).unwrap_or(Value::Null),
        );
        record
    }

    /// An item to put back on the active list.
    pub fn to_new_item(&self) -> NewItem {
        NewItem::new(self.name.clone())
            .with_unit(self.unit.clone())
            .with_quantity(i64::from(self.quantity))
            .with_image_url(self.image_url.clone())
    }
}

/// A trip with its snapshots, in the order they were archived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub status: ArchiveStatus,
    pub completed_at: DateTime<Utc>,
    pub items: Vec<HistoryItem>,
}

impl HistoryEntry {
    /// Joins trips with their snapshots. Snapshots keep their relative order.
    pub fn assemble(records: Vec<HistoryRecord>, items: Vec<HistoryItem>) -> Vec<HistoryEntry> {
        let mut by_trip: HashMap<String, Vec<HistoryItem>> = HashMap::new();
        for item in items {
            by_trip.entry(item.history_id.clone()).or_default().push(item);
        }

        records
            .into_iter()
            .map(|record| HistoryEntry {
                items: by_trip.remove(&record.id).unwrap_or_default(),
                id: record.id,
                status: record.status,
                completed_at: record.completed_at,
            })
            .collect()
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({} item(s))",
            self.completed_at.format("%Y-%m-%d %H:%M"),
            self.items.len()
        )?;
        for item in &self.items {
            writeln!(f, "  - {} x{} {}", item.name, item.quantity, item.unit)?;
        }
        Ok(())
    }
}

/// The most recent snapshot of an item name across all trips.
///
/// Derived on read; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryProduct {
    pub name: String,
    pub unit: String,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub last_used: DateTime<Utc>,
}

impl HistoryProduct {
    pub fn to_new_item(&self) -> NewItem {
        NewItem::new(self.name.clone())
            .with_unit(self.unit.clone())
            .with_quantity(i64::from(self.quantity))
            .with_image_url(self.image_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(id: &str, history_id: &str, name: &str) -> HistoryItem {
        HistoryItem {
            id: id.into(),
            history_id: history_id.into(),
            source_item_id: None,
            name: name.into(),
            unit: "個".into(),
            quantity: 1,
            image_url: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 11, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_assemble_groups_snapshots_by_trip() {
        let completed_at = Utc.with_ymd_and_hms(2026, 1, 11, 9, 0, 0).unwrap();
        let records = vec![
            HistoryRecord {
                id: "h2".into(),
                status: ArchiveStatus::Complete,
                completed_at,
            },
            HistoryRecord {
                id: "h1".into(),
                status: ArchiveStatus::Complete,
                completed_at,
            },
        ];
        let items = vec![
            snapshot("s1", "h1", "Milk"),
            snapshot("s2", "h2", "Bread"),
            snapshot("s3", "h1", "Eggs"),
        ];

        let entries = HistoryEntry::assemble(records, items);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "h2");
        assert_eq!(entries[0].items.len(), 1);
        let names: Vec<&str> = entries[1].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Eggs"]);
    }

    #[test]
    fn test_assemble_keeps_empty_trips() {
        let records = vec![HistoryRecord {
            id: "h1".into(),
            status: ArchiveStatus::Archiving,
            completed_at: Utc::now(),
        }];
        let entries = HistoryEntry::assemble(records, Vec::new());
        assert_eq!(entries.len(), 1);
        assert!(entries[0].items.is_empty());
    }

    #[test]
    fn test_archive_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ArchiveStatus::Complete).unwrap(),
            Value::from("complete")
        );
        assert_eq!(ArchiveStatus::Archiving.as_str(), "archiving");
    }

    #[test]
    fn test_snapshot_to_new_item() {
        let mut item = snapshot("s1", "h1", "Milk");
        item.quantity = 3;
        item.image_url = Some("http://localhost/storage/a.jpg".into());

        let new_item = item.to_new_item();
        assert_eq!(new_item.name, "Milk");
        assert_eq!(new_item.quantity, 3);
        assert_eq!(new_item.image_url, item.image_url);
    }
}
