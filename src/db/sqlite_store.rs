//! `RemoteStore` over SQLite.
//!
//! Column names in generated SQL always come from the static collection
//! schema; client-supplied values are bound as parameters.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use shoplist_core::store::{
    ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, Collection, Column, ColumnKind, Condition,
    Filter, Query, Record, RemoteStore, StoreError,
};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// A value ready to bind into a statement.
enum Bound {
    Text(String),
    Int(i64),
    Null,
}

fn bound(column: &Column, value: &Value) -> Result<Bound, StoreError> {
    column.check_value(value)?;
    match value {
        Value::Null => Ok(Bound::Null),
        Value::Bool(b) => Ok(Bound::Int(i64::from(*b))),
        Value::String(s) => Ok(Bound::Text(s.clone())),
        Value::Number(n) => n.as_i64().map(Bound::Int).ok_or_else(|| StoreError::InvalidValue {
            field: column.name.to_string(),
            reason: format!("{} is not an integer", n),
        }),
        other => Err(StoreError::InvalidValue {
            field: column.name.to_string(),
            reason: format!("unsupported value {}", other),
        }),
    }
}

fn push_bound(qb: &mut QueryBuilder<'_, Sqlite>, value: Bound) {
    match value {
        Bound::Text(s) => {
            qb.push_bind(s);
        }
        Bound::Int(i) => {
            qb.push_bind(i);
        }
        Bound::Null => {
            qb.push_bind(Option::<String>::None);
        }
    }
}

fn push_filter(
    qb: &mut QueryBuilder<'_, Sqlite>,
    collection: Collection,
    filter: &Filter,
) -> Result<(), StoreError> {
    collection.check_filter(filter)?;
    for (i, condition) in filter.conditions.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match condition {
            Condition::Eq { field, value } => {
                let column = collection.column(field)?;
                if value.is_null() {
                    qb.push(format!("{} IS NULL", column.name));
                } else {
                    qb.push(format!("{} = ", column.name));
                    push_bound(qb, bound(column, value)?);
                }
            }
            Condition::In { field, values } => {
                let column = collection.column(field)?;
                if values.is_empty() {
                    qb.push("0 = 1");
                    continue;
                }
                qb.push(format!("{} IN (", column.name));
                for (j, value) in values.iter().enumerate() {
                    if j > 0 {
                        qb.push(", ");
                    }
                    push_bound(qb, bound(column, value)?);
                }
                qb.push(")");
            }
        }
    }
    Ok(())
}

fn column_list(collection: Collection) -> String {
    collection
        .columns()
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_row(collection: Collection, row: &SqliteRow) -> Result<Record, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());
    let mut record = Record::new();
    for column in collection.columns() {
        let value = match column.kind {
            ColumnKind::Text | ColumnKind::Timestamp => {
                Value::from(row.try_get::<String, _>(column.name).map_err(decode)?)
            }
            ColumnKind::NullableText => row
                .try_get::<Option<String>, _>(column.name)
                .map_err(decode)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            ColumnKind::Integer => Value::from(row.try_get::<i64, _>(column.name).map_err(decode)?),
            ColumnKind::Boolean => Value::from(row.try_get::<bool, _>(column.name).map_err(decode)?),
        };
        record.insert(column.name.to_string(), value);
    }
    Ok(record)
}

fn db_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::Other => StoreError::Backend(db.message().to_string()),
            _ => StoreError::Constraint(db.message().to_string()),
        },
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Backend(e.to_string()),
    }
}

/// Shopping data in SQLite, with a change hub fed by every write.
pub struct SqliteStore {
    pool: SqlitePool,
    hub: ChangeHub,
    clock: Mutex<DateTime<Utc>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hub: ChangeHub::new(),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creation timestamp, strictly increasing so creation order is stable.
    fn tick(&self) -> String {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        *clock = if now > *clock {
            now
        } else {
            *clock + Duration::microseconds(1)
        };
        clock.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    async fn publish(&self, collection: Collection, kind: ChangeKind, affected: u64) {
        if affected > 0 {
            self.hub.publish(ChangeEvent::new(collection, kind)).await;
        }
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn select(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Record>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {}",
            column_list(collection),
            collection.name()
        ));
        push_filter(&mut qb, collection, &query.filter)?;

        match &query.order {
            Some(order) => {
                let column = collection.column(&order.field)?;
                qb.push(format!(
                    " ORDER BY {} {}, rowid ASC",
                    column.name,
                    if order.ascending { "ASC" } else { "DESC" }
                ));
            }
            None => {
                qb.push(" ORDER BY rowid ASC");
            }
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        tracing::debug!("select {} -> {} row(s)", collection, rows.len());
        rows.iter().map(|row| decode_row(collection, row)).collect()
    }

    async fn insert(
        &self,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in &records {
            collection.check_writable(record)?;
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut stored = Vec::with_capacity(records.len());
        for record in &records {
            let mut names = vec!["id", collection.created_column()];
            let mut values = vec![
                Bound::Text(Uuid::new_v4().to_string()),
                Bound::Text(self.tick()),
            ];
            for (field, value) in record {
                let column = collection.column(field)?;
                names.push(column.name);
                values.push(bound(column, value)?);
            }

            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "INSERT INTO {} ({}) VALUES (",
                collection.name(),
                names.join(", ")
            ));
            for (i, value) in values.into_iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_bound(&mut qb, value);
            }
            qb.push(format!(") RETURNING {}", column_list(collection)));

            let row = qb.build().fetch_one(&mut *tx).await.map_err(db_err)?;
            stored.push(decode_row(collection, &row)?);
        }
        tx.commit().await.map_err(db_err)?;

        tracing::debug!("insert {} -> {} row(s)", collection, stored.len());
        self.publish(collection, ChangeKind::Insert, stored.len() as u64)
            .await;
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<u64, StoreError> {
        if filter.is_empty() {
            return Err(StoreError::UnfilteredWrite("update"));
        }
        collection.check_writable(&patch)?;
        if patch.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", collection.name()));
        for (i, (field, value)) in patch.iter().enumerate() {
            let column = collection.column(field)?;
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format!("{} = ", column.name));
            push_bound(&mut qb, bound(column, value)?);
        }
        push_filter(&mut qb, collection, filter)?;

        let affected = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        tracing::debug!("update {} -> {} row(s)", collection, affected);
        self.publish(collection, ChangeKind::Update, affected).await;
        Ok(affected)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        if filter.is_empty() {
            return Err(StoreError::UnfilteredWrite("delete"));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {}", collection.name()));
        push_filter(&mut qb, collection, filter)?;

        let affected = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        tracing::debug!("delete {} -> {} row(s)", collection, affected);
        self.publish(collection, ChangeKind::Delete, affected).await;
        Ok(affected)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", collection.name()));
        push_filter(&mut qb, collection, filter)?;

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    async fn subscribe(&self, collection: Collection) -> Result<ChangeFeed, StoreError> {
        Ok(self.hub.subscribe(collection).await)
    }
}
