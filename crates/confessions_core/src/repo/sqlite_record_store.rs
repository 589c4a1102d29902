//! SQLite-backed record store.
//!
//! # Responsibility
//! - Mirror the remote collection's flat shape in the local `records` table
//!   for offline sessions and the CLI.
//! - Accept the same partial-field patches as the remote store.
//!
//! # Invariants
//! - Snapshot order is insertion order (`row_order ASC`).
//! - Structured `comments` values are stored as JSON text, like the remote.
//! - A patch touching zero rows reports `NotFound`.

use crate::db::ensure_migrated;
use crate::repo::record_store::{
    validate_patch_fields, FieldPatch, RawRecord, RecordStore, StoreError, StoreResult,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    category,
    timestamp,
    likes,
    comments
FROM records";

/// Local flat-record collection over a migrated connection.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Creates a store from a connection opened through `open_db*`.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_migrated(conn)?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn list_all(&self) -> StoreResult<Vec<RawRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} ORDER BY row_order ASC"))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn patch_by_id(&self, id: &str, fields: &FieldPatch) -> StoreResult<()> {
        validate_patch_fields(fields)?;
        if fields.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(fields.len());
        let mut bind_values = Vec::with_capacity(fields.len() + 1);
        for (field, value) in fields {
            assignments.push(format!("{field} = ?"));
            bind_values.push(column_value(field, value)?);
        }
        bind_values.push(SqlValue::Text(id.to_string()));

        let sql = format!(
            "UPDATE records SET {} WHERE id = ?;",
            assignments.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn create(&self, record: &RawRecord) -> StoreResult<()> {
        let id = match record.id.as_ref() {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(StoreError::Decode(
                    "record to create must carry an id".to_string(),
                ))
            }
        };

        self.conn.execute(
            "INSERT INTO records (
                id,
                title,
                content,
                category,
                timestamp,
                likes,
                comments,
                row_order
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                (SELECT COALESCE(MAX(row_order) + 1, 0) FROM records)
            );",
            params![
                id,
                optional_column("title", record.title.as_ref())?,
                optional_column("content", record.content.as_ref())?,
                optional_column("category", record.category.as_ref())?,
                optional_column("timestamp", record.timestamp.as_ref())?,
                optional_column("likes", record.likes.as_ref())?,
                optional_column("comments", record.comments.as_ref())?,
            ],
        )?;
        Ok(())
    }
}

fn parse_record_row(row: &Row<'_>) -> StoreResult<RawRecord> {
    let text = |column: &str| -> rusqlite::Result<Option<Value>> {
        Ok(row.get::<_, Option<String>>(column)?.map(Value::String))
    };

    Ok(RawRecord {
        id: text("id")?,
        title: text("title")?,
        content: text("content")?,
        category: text("category")?,
        timestamp: text("timestamp")?,
        likes: row.get::<_, Option<i64>>("likes")?.map(Value::from),
        comments: text("comments")?,
    })
}

fn optional_column(field: &str, value: Option<&Value>) -> StoreResult<SqlValue> {
    match value {
        Some(value) => column_value(field, value),
        None => Ok(SqlValue::Null),
    }
}

fn column_value(field: &str, value: &Value) -> StoreResult<SqlValue> {
    if field == "likes" {
        return match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Number(number) => number
                .as_i64()
                .map(SqlValue::Integer)
                .ok_or_else(|| StoreError::Decode(format!("likes must be an integer, got {number}"))),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| StoreError::Decode(format!("likes must be an integer, got `{text}`"))),
            other => Err(StoreError::Decode(format!(
                "likes must be an integer, got {other}"
            ))),
        };
    }

    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    })
}
