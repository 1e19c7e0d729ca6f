use std::collections::HashMap;

use crate::models::{HistoryEntry, HistoryProduct};

/// Collapses every snapshot across `entries` into one product per exact
/// name, keeping the most recent snapshot's unit, quantity and image.
///
/// The result is ordered by `last_used` descending, then by name.
pub fn dedup_products(entries: &[HistoryEntry]) -> Vec<HistoryProduct> {
    let mut latest: HashMap<&str, (&HistoryEntry, usize)> = HashMap::new();

    for entry in entries {
        for (index, item) in entry.items.iter().enumerate() {
            let newer = match latest.get(item.name.as_str()) {
                None => true,
                Some((kept, kept_index)) => {
                    let kept_item = &kept.items[*kept_index];
                    (entry.completed_at, item.created_at)
                        > (kept.completed_at, kept_item.created_at)
                }
            };
            if newer {
                latest.insert(item.name.as_str(), (entry, index));
            }
        }
    }

    let mut products: Vec<HistoryProduct> = latest
        .into_values()
        .map(|(entry, index)| {
            let item = &entry.items[index];
            HistoryProduct {
                name: item.name.clone(),
                unit: item.unit.clone(),
                quantity: item.quantity,
                image_url: item.image_url.clone(),
                last_used: entry.completed_at,
            }
        })
        .collect();
    products.sort_by(|a, b| b.last_used.cmp(&a.last_used).then_with(|| a.name.cmp(&b.name)));
    products
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveStatus, HistoryItem};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 18, 0, 0).unwrap()
    }

    fn trip(id: &str, day: u32, items: &[(&str, u32, Option<&str>)]) -> HistoryEntry {
        HistoryEntry {
            id: id.into(),
            status: ArchiveStatus::Complete,
            completed_at: at(day),
            items: items
                .iter()
                .enumerate()
                .map(|(i, (name, quantity, image))| HistoryItem {
                    id: format!("{}-{}", id, i),
                    history_id: id.into(),
                    source_item_id: None,
                    name: name.to_string(),
                    unit: "個".into(),
                    quantity: *quantity,
                    image_url: image.map(str::to_string),
                    created_at: at(day) + Duration::seconds(i as i64),
                })
                .collect(),
        }
    }

    #[test]
    fn test_newest_snapshot_wins() {
        let entries = vec![
            trip("t2", 9, &[("Milk", 1, None)]),
            trip("t1", 2, &[("Milk", 2, Some("http://x/storage/a.jpg")), ("Eggs", 6, None)]),
        ];

        let products = dedup_products(&entries);
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Milk");
        assert_eq!(products[0].quantity, 1);
        assert_eq!(products[0].image_url, None);
        assert_eq!(products[0].last_used, at(9));
        assert_eq!(products[1].name, "Eggs");
    }

    #[test]
    fn test_names_are_matched_exactly() {
        let entries = vec![trip("t1", 2, &[("Milk", 1, None), ("milk", 1, None)])];
        assert_eq!(dedup_products(&entries).len(), 2);
    }

    #[test]
    fn test_same_trip_keeps_later_snapshot() {
        let entries = vec![trip("t1", 2, &[("Milk", 1, None), ("Milk", 3, None)])];
        let products = dedup_products(&entries);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].quantity, 3);
    }

    #[test]
    fn test_ties_sorted_by_name() {
        let entries = vec![trip("t1", 2, &[("Tofu", 1, None), ("Apples", 4, None)])];
        let names: Vec<String> = dedup_products(&entries).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Apples", "Tofu"]);
    }
}
