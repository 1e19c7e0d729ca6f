use std::collections::BTreeSet;

use crate::models::{HistoryEntry, HistoryItem};

/// Snapshots picked for re-adding, keyed by trip id and position in the trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    keys: BTreeSet<(String, usize)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips one snapshot; returns whether it is now selected.
    pub fn toggle(&mut self, history_id: &str, index: usize) -> bool {
        let key = (history_id.to_string(), index);
        if self.keys.remove(&key) {
            false
        } else {
            self.keys.insert(key);
            true
        }
    }

    /// Selects every snapshot of `entry`, or deselects them all if every one
    /// was already selected.
    pub fn toggle_all_in(&mut self, entry: &HistoryEntry) {
        let all_selected = (0..entry.items.len()).all(|i| self.is_selected(&entry.id, i));
        for index in 0..entry.items.len() {
            let key = (entry.id.clone(), index);
            if all_selected {
                self.keys.remove(&key);
            } else {
                self.keys.insert(key);
            }
        }
    }

    pub fn is_selected(&self, history_id: &str, index: usize) -> bool {
        self.keys.contains(&(history_id.to_string(), index))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// The selected snapshots in display order. Keys that no longer match a
    /// snapshot are ignored.
    pub fn resolve<'a>(&self, entries: &'a [HistoryEntry]) -> Vec<&'a HistoryItem> {
        entries
            .iter()
            .flat_map(|entry| {
                entry
                    .items
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| self.is_selected(&entry.id, *index))
                    .map(|(_, item)| item)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArchiveStatus;
    use chrono::Utc;

    fn entry(id: &str, names: &[&str]) -> HistoryEntry {
        HistoryEntry {
            id: id.into(),
            status: ArchiveStatus::Complete,
            completed_at: Utc::now(),
            items: names
                .iter()
                .enumerate()
                .map(|(i, name)| HistoryItem {
                    id: format!("{}-{}", id, i),
                    history_id: id.into(),
                    source_item_id: None,
                    name: name.to_string(),
                    unit: "個".into(),
                    quantity: 1,
                    image_url: None,
                    created_at: Utc::now(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_toggle() {
        let mut selection = Selection::new();
        assert!(selection.toggle("t1", 0));
        assert!(selection.is_selected("t1", 0));
        assert!(!selection.toggle("t1", 0));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_toggle_all_in() {
        let trip = entry("t1", &["Milk", "Eggs", "Bread"]);
        let mut selection = Selection::new();
        selection.toggle("t1", 1);

        selection.toggle_all_in(&trip);
        assert_eq!(selection.len(), 3);

        selection.toggle_all_in(&trip);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_resolve_in_display_order() {
        let entries = vec![entry("t2", &["Tea"]), entry("t1", &["Milk", "Eggs"])];
        let mut selection = Selection::new();
        selection.toggle("t1", 1);
        selection.toggle("t2", 0);
        selection.toggle("t1", 7);

        let names: Vec<&str> = selection
            .resolve(&entries)
            .into_iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["Tea", "Eggs"]);
    }
}
