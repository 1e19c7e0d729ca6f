//! Active shopping list entries.
//!
//! A `ShoppingItem` is what the remote store holds in the `shopping_items`
//! collection. New entries are described by a `NewItem`, which the store
//! turns into a full item by assigning the id and creation timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::store::{Record, StoreError};

/// Unit used when an item is added without one.
pub const DEFAULT_UNIT: &str = "個";

/// An entry on the active shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    /// Store-assigned identifier
    pub id: String,
    pub name: String,
    pub unit: String,
    /// Always at least 1
    pub quantity: u32,
    pub image_url: Option<String>,
    pub checked: bool,
    /// Store-assigned creation time, defines display order
    pub created_at: DateTime<Utc>,
}

impl ShoppingItem {
    /// Decodes a record returned by the store.
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(record)).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl fmt::Display for ShoppingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = if self.checked { "[x]" } else { "[ ]" };
        write!(f, "{} {:<20} {} {}", check, self.name, self.quantity, self.unit)?;
        if self.image_url.is_some() {
            write!(f, " (photo)")?;
        }
        Ok(())
    }
}

/// An item about to be added to the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub unit: String,
    pub quantity: i64,
    pub image_url: Option<String>,
}

impl NewItem {
    /// Create a new item with just a name (quantity 1, blank unit).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            quantity: 1,
            image_url: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    /// Trims the name and unit, substituting `default_unit` for a blank unit.
    ///
    /// Returns a description of the problem when the item cannot be added.
    pub fn normalized(&self, default_unit: &str) -> Result<NewItem, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("item name cannot be empty".to_string());
        }
        if self.quantity < 1 {
            return Err(format!(
                "quantity for '{}' must be at least 1, got {}",
                name, self.quantity
            ));
        }
        if self.quantity > i64::from(u32::MAX) {
            return Err(format!(
                "quantity for '{}' must be at most {}, got {}",
                name,
                u32::MAX,
                self.quantity
            ));
        }
        let unit = match self.unit.trim() {
            "" => default_unit.to_string(),
            u => u.to_string(),
        };
        Ok(NewItem {
            name: name.to_string(),
            unit,
            quantity: self.quantity,
            image_url: self.image_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    /// Fields for the `shopping_items` insert.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), Value::from(self.name.clone()));
        record.insert("unit".into(), Value::from(self.unit.clone()));
        record.insert("quantity".into(), Value::from(self.quantity));
        record.insert(
            "image_url".into(),
            self.image_url.clone().map(Value::from).unwrap_or(Value::Null),
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_trims_and_defaults_unit() {
        let item = NewItem::new("  Milk ").with_unit("   ").with_quantity(2);
        let normalized = item.normalized(DEFAULT_UNIT).unwrap();
        assert_eq!(normalized.name, "Milk");
        assert_eq!(normalized.unit, DEFAULT_UNIT);
        assert_eq!(normalized.quantity, 2);
    }

    #[test]
    fn test_normalized_rejects_blank_name() {
        assert!(NewItem::new("   ").normalized(DEFAULT_UNIT).is_err());
    }

    #[test]
    fn test_normalized_rejects_non_positive_quantity() {
        let err = NewItem::new("Eggs")
            .with_quantity(0)
            .normalized(DEFAULT_UNIT)
            .unwrap_err();
        assert!(err.contains("at least 1"));
    }

    #[test]
    fn test_normalized_rejects_quantity_beyond_u32() {
        let err = NewItem::new("Rice")
            .with_quantity(5_000_000_000)
            .normalized(DEFAULT_UNIT)
            .unwrap_err();
        assert!(err.contains("at most 4294967295"));

        let max = NewItem::new("Rice").with_quantity(i64::from(u32::MAX));
        assert_eq!(max.normalized(DEFAULT_UNIT).unwrap().quantity, 4_294_967_295);
    }

    #[test]
    fn test_normalized_drops_blank_image_url() {
        let item = NewItem::new("Eggs").with_image_url(Some(" ".into()));
        assert!(item.normalized(DEFAULT_UNIT).unwrap().image_url.is_none());
    }

    #[test]
    fn test_from_record() {
        let record = json!({
            "id": "a1",
            "name": "Eggs",
            "unit": "dozen",
            "quantity": 1,
            "image_url": null,
            "checked": false,
            "created_at": "2026-01-11T09:30:00.000000Z"
        });
        let Value::Object(record) = record else {
            unreachable!()
        };

        let item = ShoppingItem::from_record(record).unwrap();
        assert_eq!(item.id, "a1");
        assert_eq!(item.unit, "dozen");
        assert!(!item.checked);
        assert!(item.image_url.is_none());
    }

    #[test]
    fn test_from_record_rejects_missing_fields() {
        let Value::Object(record) = json!({ "id": "a1" }) else {
            unreachable!()
        };
        assert!(matches!(
            ShoppingItem::from_record(record),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn test_display() {
        let item = ShoppingItem {
            id: "a1".into(),
            name: "Eggs".into(),
            unit: "dozen".into(),
            quantity: 2,
            image_url: None,
            checked: true,
            created_at: Utc::now(),
        };
        let output = format!("{}", item);
        assert!(output.starts_with("[x] Eggs"));
        assert!(output.contains("2 dozen"));
    }
}
