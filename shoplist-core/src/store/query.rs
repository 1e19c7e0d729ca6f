//! Collections, filters and queries understood by every remote store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StoreError;

/// A row as exchanged with the store: field name -> JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Named collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    ShoppingItems,
    ShoppingHistory,
    ShoppingHistoryItems,
}

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    NullableText,
    Integer,
    Boolean,
    /// RFC 3339 string
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// False for columns the store assigns itself
    pub writable: bool,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        writable: true,
    }
}

const fn assigned(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        writable: false,
    }
}

const SHOPPING_ITEMS: &[Column] = &[
    assigned("id", ColumnKind::Text),
    col("name", ColumnKind::Text),
    col("unit", ColumnKind::Text),
    col("quantity", ColumnKind::Integer),
    col("image_url", ColumnKind::NullableText),
    col("checked", ColumnKind::Boolean),
    assigned("created_at", ColumnKind::Timestamp),
];

const SHOPPING_HISTORY: &[Column] = &[
    assigned("id", ColumnKind::Text),
    col("status", ColumnKind::Text),
    assigned("completed_at", ColumnKind::Timestamp),
];

const SHOPPING_HISTORY_ITEMS: &[Column] = &[
    assigned("id", ColumnKind::Text),
    col("history_id", ColumnKind::Text),
    col("source_item_id", ColumnKind::NullableText),
    col("name", ColumnKind::Text),
    col("unit", ColumnKind::Text),
    col("quantity", ColumnKind::Integer),
    col("image_url", ColumnKind::NullableText),
    assigned("created_at", ColumnKind::Timestamp),
];

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::ShoppingItems,
        Collection::ShoppingHistory,
        Collection::ShoppingHistoryItems,
    ];

    /// Table / route name.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::ShoppingItems => "shopping_items",
            Collection::ShoppingHistory => "shopping_history",
            Collection::ShoppingHistoryItems => "shopping_history_items",
        }
    }

    /// Parse from a table / route name.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| StoreError::UnknownCollection(s.to_string()))
    }

    pub fn columns(&self) -> &'static [Column] {
        match self {
            Collection::ShoppingItems => SHOPPING_ITEMS,
            Collection::ShoppingHistory => SHOPPING_HISTORY,
            Collection::ShoppingHistoryItems => SHOPPING_HISTORY_ITEMS,
        }
    }

    /// Column holding the store-assigned creation time.
    pub fn created_column(&self) -> &'static str {
        match self {
            Collection::ShoppingHistory => "completed_at",
            _ => "created_at",
        }
    }

    pub fn column(&self, field: &str) -> Result<&'static Column, StoreError> {
        self.columns()
            .iter()
            .find(|c| c.name == field)
            .ok_or_else(|| StoreError::UnknownField {
                collection: self.name().to_string(),
                field: field.to_string(),
            })
    }

    /// Checks that every field of an insert or patch exists, may be written
    /// by clients and carries a value of the right type.
    pub fn check_writable(&self, record: &Record) -> Result<(), StoreError> {
        for (field, value) in record {
            let column = self.column(field)?;
            if !column.writable {
                return Err(StoreError::ReadOnlyField(field.clone()));
            }
            column.check_value(value)?;
        }
        Ok(())
    }

    pub fn check_filter(&self, filter: &Filter) -> Result<(), StoreError> {
        for condition in &filter.conditions {
            match condition {
                Condition::Eq { field, value } => {
                    let column = self.column(field)?;
                    if !value.is_null() {
                        column.check_value(value)?;
                    }
                }
                Condition::In { field, values } => {
                    let column = self.column(field)?;
                    for value in values {
                        column.check_value(value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Column {
    pub fn check_value(&self, value: &Value) -> Result<(), StoreError> {
        let ok = match self.kind {
            ColumnKind::Text | ColumnKind::Timestamp => value.is_string(),
            ColumnKind::NullableText => value.is_string() || value.is_null(),
            ColumnKind::Integer => value.as_i64().is_some(),
            ColumnKind::Boolean => value.is_boolean(),
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::InvalidValue {
                field: self.name.to_string(),
                reason: format!("expected {:?}, got {}", self.kind, value),
            })
        }
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// `field = value`, or `field IS NULL` when `value` is null
    Eq { field: String, value: Value },
    /// `field IN (values)`; matches nothing when `values` is empty
    In { field: String, values: Vec<Value> },
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub ascending: bool,
}

/// A select request: filter, optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filter: Filter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_parse_roundtrip() {
        for collection in Collection::ALL {
            assert_eq!(Collection::parse(collection.name()).unwrap(), collection);
        }
        assert!(matches!(
            Collection::parse("users"),
            Err(StoreError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_check_writable_rejects_assigned_fields() {
        let Value::Object(record) = json!({ "id": "x", "name": "Milk" }) else {
            unreachable!()
        };
        assert_eq!(
            Collection::ShoppingItems.check_writable(&record),
            Err(StoreError::ReadOnlyField("id".into()))
        );
    }

    #[test]
    fn test_check_writable_rejects_unknown_and_mistyped_fields() {
        let Value::Object(unknown) = json!({ "price": 3 }) else {
            unreachable!()
        };
        assert!(matches!(
            Collection::ShoppingItems.check_writable(&unknown),
            Err(StoreError::UnknownField { .. })
        ));

        let Value::Object(mistyped) = json!({ "checked": "yes" }) else {
            unreachable!()
        };
        assert!(matches!(
            Collection::ShoppingItems.check_writable(&mistyped),
            Err(StoreError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_check_filter_allows_null_equality() {
        let filter = Filter::all().eq("image_url", Value::Null);
        assert!(Collection::ShoppingItems.check_filter(&filter).is_ok());

        let filter = Filter::all().eq("name", Value::Null);
        assert!(Collection::ShoppingItems.check_filter(&filter).is_ok());
    }

    #[test]
    fn test_created_column() {
        assert_eq!(Collection::ShoppingHistory.created_column(), "completed_at");
        assert_eq!(Collection::ShoppingItems.created_column(), "created_at");
    }

    #[test]
    fn test_query_serialization_shape() {
        let query = Query::new()
            .filter(Filter::all().eq("checked", true).is_in("id", ["a", "b"]))
            .order_by("created_at", true)
            .limit(10);

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["filter"]["conditions"][0]["op"], "eq");
        assert_eq!(value["filter"]["conditions"][1]["values"], json!(["a", "b"]));
        assert_eq!(value["order"]["field"], "created_at");

        let parsed: Query = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, query);
    }

    #[test]
    fn test_query_defaults_when_fields_missing() {
        let parsed: Query = serde_json::from_value(json!({})).unwrap();
        assert!(parsed.filter.is_empty());
        assert!(parsed.order.is_none());
        assert!(parsed.limit.is_none());
    }
}
