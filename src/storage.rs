use crate::db::DatabaseManager;
use crate::error::{ApiError, Result};
use crate::ordering::{order_by_clause, OrderTerm};
use crate::schema::{Entity, FieldDefault, FieldKind, FixedPoint};
use crate::validation::{now_timestamp, validate_payload, WriteMode};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// A rendered row: field name to wire value.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub ordering: Vec<OrderTerm>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Storage trait for persisting entity rows
#[async_trait]
pub trait Storage: Send + Sync {
    async fn list(&self, entity: &'static Entity, query: &ListQuery) -> Result<Vec<Record>>;
    async fn get(&self, entity: &'static Entity, id: i64) -> Result<Option<Record>>;
    async fn create(&self, entity: &'static Entity, payload: &Map<String, Value>) -> Result<Record>;
    /// Full (`partial == false`) or partial update of an existing row.
    async fn update(
        &self,
        entity: &'static Entity,
        id: i64,
        payload: &Map<String, Value>,
        partial: bool,
    ) -> Result<Record>;
    async fn delete(&self, entity: &'static Entity, id: i64) -> Result<()>;
}

/// SQLite-backed storage over a single shared connection.
pub struct SqliteStorage {
    db: Arc<DatabaseManager>,
}

impl SqliteStorage {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn render_row(entity: &Entity, row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Map::new();
    for (idx, field) in entity
        .fields
        .iter()
        .filter(|f| !f.is_write_only())
        .enumerate()
    {
        let raw: SqlValue = row.get(idx)?;
        let value = match (raw, field.kind) {
            (SqlValue::Null, _) => Value::Null,
            (SqlValue::Integer(i), FieldKind::Bool) => Value::Bool(i != 0),
            (SqlValue::Integer(i), FieldKind::Decimal { places, .. }) => {
                Value::String(FixedPoint::from_scaled(i, places).to_string())
            }
            (SqlValue::Integer(i), _) => Value::from(i),
            (SqlValue::Real(r), _) => Value::from(r),
            (SqlValue::Text(s), _) => Value::String(s),
            (SqlValue::Blob(b), _) => Value::String(hex::encode(b)),
        };
        record.insert(field.name.to_string(), value);
    }
    Ok(record)
}

fn fetch_one(conn: &Connection, entity: &Entity, id: i64) -> Result<Option<Record>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        entity.select_columns(),
        entity.table
    );
    Ok(conn
        .query_row(&sql, [id], |row| render_row(entity, row))
        .optional()?)
}

fn exists(conn: &Connection, entity: &Entity, id: i64) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", entity.table);
    Ok(conn.query_row(&sql, [id], |_| Ok(())).optional()?.is_some())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn list(&self, entity: &'static Entity, query: &ListQuery) -> Result<Vec<Record>> {
        let query = query.clone();
        self.db.interact(move |conn| {
            let mut sql = format!(
                "SELECT {} FROM {} ORDER BY {}",
                entity.select_columns(),
                entity.table,
                order_by_clause(&query.ordering)
            );
            match (query.limit, query.offset) {
                (Some(limit), offset) => {
                    sql.push_str(&format!(" LIMIT {limit} OFFSET {}", offset.unwrap_or(0)))
                }
                (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                (None, None) => {}
            }
            debug!(entity = entity.name, %sql, "list");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| render_row(entity, row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get(&self, entity: &'static Entity, id: i64) -> Result<Option<Record>> {
        self.db
            .interact(move |conn| fetch_one(conn, entity, id))
            .await
    }

    async fn create(&self, entity: &'static Entity, payload: &Map<String, Value>) -> Result<Record> {
        let payload = payload.clone();
        self.db.interact(move |conn| {
            let mut values = validate_payload(conn, entity, &payload, WriteMode::Create, None)?;

            // Read-only timestamps (created_at, modified_at, sale.date) are stamped here.
            let now = now_timestamp();
            for field in entity.fields.iter().filter(|f| f.read_only) {
                if matches!(field.default, FieldDefault::Now) {
                    values.push((field, SqlValue::Text(now.clone())));
                }
            }

            let columns: Vec<&str> = values.iter().map(|(f, _)| f.column).collect();
            let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                entity.table,
                columns.join(", "),
                placeholders.join(", ")
            );
            conn.execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))
                .map_err(ApiError::from_write)?;
            let id = conn.last_insert_rowid();
            info!(entity = entity.name, id, "created");

            fetch_one(conn, entity, id)?.ok_or(ApiError::NotFound)
        })
        .await
    }

    async fn update(
        &self,
        entity: &'static Entity,
        id: i64,
        payload: &Map<String, Value>,
        partial: bool,
    ) -> Result<Record> {
        let payload = payload.clone();
        self.db.interact(move |conn| {
            if !exists(conn, entity, id)? {
                return Err(ApiError::NotFound);
            }
            let mode = if partial {
                WriteMode::Partial
            } else {
                WriteMode::Replace
            };
            let values = validate_payload(conn, entity, &payload, mode, Some(id))?;

            let mut assignments = vec!["modified_at = ?1".to_string()];
            let mut params: Vec<SqlValue> = vec![SqlValue::Text(now_timestamp())];
            for (field, value) in values {
                params.push(value);
                assignments.push(format!("{} = ?{}", field.column, params.len()));
            }
            params.push(SqlValue::Integer(id));
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                entity.table,
                assignments.join(", "),
                params.len()
            );
            conn.execute(&sql, params_from_iter(params.iter()))
                .map_err(ApiError::from_write)?;
            info!(entity = entity.name, id, partial, "updated");

            fetch_one(conn, entity, id)?.ok_or(ApiError::NotFound)
        })
        .await
    }

    async fn delete(&self, entity: &'static Entity, id: i64) -> Result<()> {
        self.db.interact(move |conn| {
            let sql = format!("DELETE FROM {} WHERE id = ?1", entity.table);
            let affected = conn.execute(&sql, [id]).map_err(ApiError::from_write)?;
            if affected == 0 {
                return Err(ApiError::NotFound);
            }
            info!(entity = entity.name, id, "deleted");
            Ok(())
        })
        .await
    }
}
