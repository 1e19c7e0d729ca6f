//! Pending-operation log for optimistic mutations.
//!
//! Every optimistic change is recorded with the state needed to undo it,
//! keyed by a client-generated correlation id. The entry is dropped once the
//! remote confirms; on failure it is rolled back and kept as a
//! `MutationFailure` for the caller to inspect.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::ShoppingItem;

/// An optimistic change and what it replaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    Remove {
        item: ShoppingItem,
    },
    Check {
        id: String,
        previous: bool,
        next: bool,
    },
    Quantity {
        id: String,
        previous: u32,
        next: u32,
    },
    Rename {
        id: String,
        previous: String,
        next: String,
    },
    ClearChecked {
        items: Vec<ShoppingItem>,
    },
    CompleteTrip {
        items: Vec<ShoppingItem>,
    },
}

impl Mutation {
    pub fn describe(&self) -> String {
        match self {
            Mutation::Remove { item } => format!("remove '{}'", item.name),
            Mutation::Check { id, next, .. } => {
                format!("{} {}", if *next { "check" } else { "uncheck" }, id)
            }
            Mutation::Quantity { id, next, .. } => format!("set quantity of {} to {}", id, next),
            Mutation::Rename { next, .. } => format!("rename to '{}'", next),
            Mutation::ClearChecked { items } => format!("clear {} checked item(s)", items.len()),
            Mutation::CompleteTrip { items } => format!("complete trip of {} item(s)", items.len()),
        }
    }

    /// Re-applies the change on top of freshly loaded items.
    pub(crate) fn apply(&self, items: &mut Vec<ShoppingItem>) {
        match self {
            Mutation::Remove { item } => items.retain(|i| i.id != item.id),
            Mutation::Check { id, next, .. } => {
                if let Some(item) = items.iter_mut().find(|i| &i.id == id) {
                    item.checked = *next;
                }
            }
            Mutation::Quantity { id, next, .. } => {
                if let Some(item) = items.iter_mut().find(|i| &i.id == id) {
                    item.quantity = *next;
                }
            }
            Mutation::Rename { id, next, .. } => {
                if let Some(item) = items.iter_mut().find(|i| &i.id == id) {
                    item.name = next.clone();
                }
            }
            Mutation::ClearChecked { items: removed } | Mutation::CompleteTrip { items: removed } => {
                items.retain(|i| !removed.iter().any(|r| r.id == i.id));
            }
        }
    }

    /// Undoes the change. A field is only restored while it still holds the
    /// value this mutation wrote, so later changes are not clobbered.
    pub(crate) fn revert(&self, items: &mut Vec<ShoppingItem>) {
        match self {
            Mutation::Remove { item } => restore(items, item),
            Mutation::Check { id, previous, next } => {
                if let Some(item) = items.iter_mut().find(|i| &i.id == id) {
                    if item.checked == *next {
                        item.checked = *previous;
                    }
                }
            }
            Mutation::Quantity { id, previous, next } => {
                if let Some(item) = items.iter_mut().find(|i| &i.id == id) {
                    if item.quantity == *next {
                        item.quantity = *previous;
                    }
                }
            }
            Mutation::Rename { id, previous, next } => {
                if let Some(item) = items.iter_mut().find(|i| &i.id == id) {
                    if &item.name == next {
                        item.name = previous.clone();
                    }
                }
            }
            Mutation::ClearChecked { items: removed } | Mutation::CompleteTrip { items: removed } => {
                for item in removed {
                    restore(items, item);
                }
            }
        }
    }
}

/// Puts `item` back in creation order unless it is already present.
fn restore(items: &mut Vec<ShoppingItem>, item: &ShoppingItem) {
    if !items.iter().any(|i| i.id == item.id) {
        insert_ordered(items, item.clone());
    }
}

/// Inserts or replaces `item`, keeping `items` sorted by `created_at`.
pub(crate) fn insert_ordered(items: &mut Vec<ShoppingItem>, item: ShoppingItem) {
    if let Some(existing) = items.iter_mut().find(|i| i.id == item.id) {
        *existing = item;
        return;
    }
    let at = items.partition_point(|i| i.created_at <= item.created_at);
    items.insert(at, item);
}

/// A mutation awaiting remote confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMutation {
    pub correlation_id: Uuid,
    pub mutation: Mutation,
    pub issued_at: DateTime<Utc>,
}

impl PendingMutation {
    pub(crate) fn new(mutation: Mutation) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            mutation,
            issued_at: Utc::now(),
        }
    }
}

/// A mutation the remote rejected or never acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationFailure {
    pub correlation_id: Uuid,
    pub description: String,
    pub error: String,
    /// Whether the local change was undone
    pub rolled_back: bool,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(id: &str, minute: i64) -> ShoppingItem {
        ShoppingItem {
            id: id.into(),
            name: id.to_uppercase(),
            unit: "個".into(),
            quantity: 1,
            image_url: None,
            checked: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, 11, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    fn ids(items: &[ShoppingItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_insert_ordered_keeps_creation_order() {
        let mut items = vec![item("a", 0), item("c", 2)];
        insert_ordered(&mut items, item("b", 1));
        insert_ordered(&mut items, item("d", 3));
        assert_eq!(ids(&items), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_insert_ordered_replaces_existing_id() {
        let mut items = vec![item("a", 0), item("b", 1)];
        let mut updated = item("a", 0);
        updated.quantity = 5;
        insert_ordered(&mut items, updated);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 5);
    }

    #[test]
    fn test_revert_remove_restores_position() {
        let mut items = vec![item("a", 0), item("c", 2)];
        let removed = Mutation::Remove { item: item("b", 1) };
        removed.revert(&mut items);
        assert_eq!(ids(&items), vec!["a", "b", "c"]);

        // Already back (e.g. after a reload): no duplicate
        removed.revert(&mut items);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_revert_skips_fields_changed_since() {
        let mut items = vec![item("a", 0)];
        let first = Mutation::Quantity {
            id: "a".into(),
            previous: 1,
            next: 2,
        };
        first.apply(&mut items);
        let second = Mutation::Quantity {
            id: "a".into(),
            previous: 2,
            next: 3,
        };
        second.apply(&mut items);

        first.revert(&mut items);
        assert_eq!(items[0].quantity, 3);
    }

    #[test]
    fn test_apply_clear_checked_on_reloaded_items() {
        let mut checked = item("b", 1);
        checked.checked = true;
        let mutation = Mutation::ClearChecked {
            items: vec![checked],
        };

        let mut reloaded = vec![item("a", 0), item("b", 1)];
        mutation.apply(&mut reloaded);
        assert_eq!(ids(&reloaded), vec!["a"]);
    }

    #[test]
    fn test_describe() {
        let mutation = Mutation::Check {
            id: "a".into(),
            previous: false,
            next: true,
        };
        assert_eq!(mutation.describe(), "check a");
    }
}
