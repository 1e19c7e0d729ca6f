//! In-memory store used by the unit tests.
//!
//! Mirrors the SQLite backend's contract (defaults, constraints, cascade on
//! trip delete, one change event per write) and lets tests fail or hold
//! individual calls.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::store::{
    BlobError, BlobStore, ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, Collection, Condition,
    Filter, Query, Record, RemoteStore, StoreError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Select,
    Insert,
    Update,
    Delete,
    Count,
}

enum Fault {
    Fail,
    Hold(oneshot::Receiver<()>),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct MemoryStore {
    tables: Mutex<HashMap<Collection, Vec<Record>>>,
    faults: Mutex<Vec<(Op, Collection, Fault)>>,
    calls: Mutex<Vec<(Op, Collection)>>,
    clock: Mutex<DateTime<Utc>>,
    hub: ChangeHub,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            faults: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            clock: Mutex::new(Utc::now()),
            hub: ChangeHub::new(),
        }
    }

    /// Makes the next `op` on `collection` fail with a transport error.
    pub(crate) fn fail_next(&self, op: Op, collection: Collection) {
        lock(&self.faults).push((op, collection, Fault::Fail));
    }

    /// Holds the next `op` on `collection` until the returned sender fires.
    pub(crate) fn hold_next(&self, op: Op, collection: Collection) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.faults).push((op, collection, Fault::Hold(rx)));
        tx
    }

    pub(crate) fn calls(&self) -> Vec<(Op, Collection)> {
        lock(&self.calls).clone()
    }

    pub(crate) fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub(crate) fn rows(&self, collection: Collection) -> Vec<Record> {
        lock(&self.tables).get(&collection).cloned().unwrap_or_default()
    }

    /// Writes a field directly, bypassing the contract (simulates another
    /// client writing without notifications).
    pub(crate) fn poke(&self, collection: Collection, id: &str, field: &str, value: Value) {
        let mut tables = lock(&self.tables);
        if let Some(row) = tables
            .entry(collection)
            .or_default()
            .iter_mut()
            .find(|r| r.get("id") == Some(&Value::from(id)))
        {
            row.insert(field.to_string(), value);
        }
    }

    async fn enter(&self, op: Op, collection: Collection) -> Result<(), StoreError> {
        lock(&self.calls).push((op, collection));
        let fault = {
            let mut faults = lock(&self.faults);
            faults
                .iter()
                .position(|(o, c, _)| *o == op && *c == collection)
                .map(|i| faults.remove(i).2)
        };
        match fault {
            Some(Fault::Fail) => Err(StoreError::Transport("injected fault".into())),
            Some(Fault::Hold(rx)) => {
                let _ = rx.await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn tick(&self) -> String {
        let mut clock = lock(&self.clock);
        let now = Utc::now();
        *clock = if now > *clock {
            now
        } else {
            *clock + Duration::microseconds(1)
        };
        clock.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

fn default_for(collection: Collection, field: &str) -> Option<Value> {
    match (collection, field) {
        (Collection::ShoppingItems | Collection::ShoppingHistoryItems, "unit") => {
            Some(Value::from("個"))
        }
        (Collection::ShoppingItems | Collection::ShoppingHistoryItems, "quantity") => {
            Some(Value::from(1))
        }
        (Collection::ShoppingItems, "checked") => Some(Value::from(false)),
        (_, "image_url") | (_, "source_item_id") => Some(Value::Null),
        (Collection::ShoppingHistory, "status") => Some(Value::from("archiving")),
        _ => None,
    }
}

fn check_constraints(collection: Collection, row: &Record) -> Result<(), StoreError> {
    if let Some(q) = row.get("quantity").and_then(Value::as_i64) {
        if q < 1 || q > i64::from(u32::MAX) {
            return Err(StoreError::Constraint(format!("quantity {} out of range", q)));
        }
    }
    if let Some(name) = row.get("name").and_then(Value::as_str) {
        if name.trim().is_empty() {
            return Err(StoreError::Constraint("name must not be blank".into()));
        }
    }
    if collection == Collection::ShoppingHistory {
        let status = row.get("status").and_then(Value::as_str).unwrap_or_default();
        if status != "archiving" && status != "complete" {
            return Err(StoreError::Constraint(format!("bad status '{}'", status)));
        }
    }
    Ok(())
}

fn matches(row: &Record, filter: &Filter) -> bool {
    filter.conditions.iter().all(|condition| match condition {
        Condition::Eq { field, value } => row.get(field).unwrap_or(&Value::Null) == value,
        Condition::In { field, values } => row.get(field).is_some_and(|v| values.contains(v)),
    })
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a.as_i64().cmp(&b.as_i64()),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Record>, StoreError> {
        self.enter(Op::Select, collection).await?;
        collection.check_filter(&query.filter)?;

        let mut rows: Vec<Record> = self
            .rows(collection)
            .into_iter()
            .filter(|r| matches(r, &query.filter))
            .collect();
        if let Some(order) = &query.order {
            collection.column(&order.field)?;
            let null = Value::Null;
            rows.sort_by(|a, b| {
                let ord = compare(
                    a.get(&order.field).unwrap_or(&null),
                    b.get(&order.field).unwrap_or(&null),
                );
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(
        &self,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        self.enter(Op::Insert, collection).await?;

        let mut prepared = Vec::with_capacity(records.len());
        for record in records {
            collection.check_writable(&record)?;
            let mut row = Record::new();
            for column in collection.columns() {
                let value = if column.name == "id" {
                    Value::from(Uuid::new_v4().to_string())
                } else if column.name == collection.created_column() {
                    Value::from(self.tick())
                } else if let Some(v) = record.get(column.name) {
                    v.clone()
                } else if let Some(v) = default_for(collection, column.name) {
                    v
                } else {
                    return Err(StoreError::Constraint(format!(
                        "{}.{} is required",
                        collection, column.name
                    )));
                };
                row.insert(column.name.to_string(), value);
            }
            check_constraints(collection, &row)?;
            prepared.push(row);
        }

        {
            let mut tables = lock(&self.tables);
            if collection == Collection::ShoppingHistoryItems {
                let trips = tables.get(&Collection::ShoppingHistory);
                for row in &prepared {
                    let parent = row.get("history_id");
                    let exists = trips.is_some_and(|t| t.iter().any(|h| h.get("id") == parent));
                    if !exists {
                        return Err(StoreError::Constraint("history_id must exist".into()));
                    }
                }
            }
            tables
                .entry(collection)
                .or_default()
                .extend(prepared.iter().cloned());
        }

        if !prepared.is_empty() {
            self.hub
                .publish(ChangeEvent::new(collection, ChangeKind::Insert))
                .await;
        }
        Ok(prepared)
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<u64, StoreError> {
        self.enter(Op::Update, collection).await?;
        if filter.is_empty() {
            return Err(StoreError::UnfilteredWrite("update"));
        }
        collection.check_filter(filter)?;
        collection.check_writable(&patch)?;

        let affected = {
            let mut tables = lock(&self.tables);
            let rows = tables.entry(collection).or_default();
            let mut updated = Vec::new();
            for (i, row) in rows.iter().enumerate() {
                if matches(row, filter) {
                    let mut next = row.clone();
                    next.extend(patch.clone());
                    check_constraints(collection, &next)?;
                    updated.push((i, next));
                }
            }
            let affected = updated.len() as u64;
            for (i, next) in updated {
                rows[i] = next;
            }
            affected
        };

        if affected > 0 {
            self.hub
                .publish(ChangeEvent::new(collection, ChangeKind::Update))
                .await;
        }
        Ok(affected)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        self.enter(Op::Delete, collection).await?;
        if filter.is_empty() {
            return Err(StoreError::UnfilteredWrite("delete"));
        }
        collection.check_filter(filter)?;

        let affected = {
            let mut tables = lock(&self.tables);
            let rows = tables.entry(collection).or_default();
            let before = rows.len();
            let mut removed_ids = Vec::new();
            rows.retain(|r| {
                let hit = matches(r, filter);
                if hit {
                    removed_ids.extend(r.get("id").cloned());
                }
                !hit
            });
            let affected = (before - rows.len()) as u64;
            if collection == Collection::ShoppingHistory {
                tables
                    .entry(Collection::ShoppingHistoryItems)
                    .or_default()
                    .retain(|r| !r.get("history_id").is_some_and(|h| removed_ids.contains(h)));
            }
            affected
        };

        if affected > 0 {
            self.hub
                .publish(ChangeEvent::new(collection, ChangeKind::Delete))
                .await;
        }
        Ok(affected)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        self.enter(Op::Count, collection).await?;
        collection.check_filter(filter)?;
        Ok(self
            .rows(collection)
            .iter()
            .filter(|r| matches(r, filter))
            .count() as u64)
    }

    async fn subscribe(&self, collection: Collection) -> Result<ChangeFeed, StoreError> {
        Ok(self.hub.subscribe(collection).await)
    }
}

pub(crate) struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_remove: Mutex<bool>,
}

impl MemoryBlobStore {
    pub(crate) fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fail_remove: Mutex::new(false),
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.blobs).keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn fail_next_remove(&self) {
        *lock(&self.fail_remove) = true;
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        crate::store::validate_blob_name(name)?;
        lock(&self.blobs).insert(name.to_string(), bytes);
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("memory://storage/{}", name)
    }

    async fn remove(&self, names: &[String]) -> Result<(), BlobError> {
        if std::mem::take(&mut *lock(&self.fail_remove)) {
            return Err(BlobError::Transport("injected fault".into()));
        }
        let mut blobs = lock(&self.blobs);
        for name in names {
            blobs.remove(name);
        }
        Ok(())
    }
}
