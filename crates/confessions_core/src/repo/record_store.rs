//! Record store contract for the flat confession collection.
//!
//! # Responsibility
//! - Define the only operations the core needs from the remote collection:
//!   full snapshot read, per-record partial write, and record creation.
//! - Carry raw records with every field optional so normalization can apply
//!   defaults instead of failing decode.
//!
//! # Invariants
//! - Stores expose request success or failure only, never partial application.
//! - No concurrency token exists; the last write to a field wins.

use crate::db::DbError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Named fields for a partial update of one record.
pub type FieldPatch = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure surface of a record store call.
#[derive(Debug)]
pub enum StoreError {
    /// Connection, DNS, TLS or timeout failure.
    Transport(String),
    /// The store answered with a non-success status.
    Status { code: u16, message: String },
    /// The response body could not be decoded.
    Decode(String),
    /// No record with this id exists.
    NotFound(String),
    /// Id cannot be addressed safely in a request path.
    InvalidRecordId(String),
    /// Patch names a field the store does not hold.
    UnknownField(String),
    /// Local SQLite-backed store failure.
    Db(DbError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "record store unreachable: {message}"),
            Self::Status { code, message } => {
                write!(f, "record store returned status {code}: {message}")
            }
            Self::Decode(message) => write!(f, "record store response undecodable: {message}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidRecordId(id) => write!(f, "record id cannot be addressed: `{id}`"),
            Self::UnknownField(field) => write!(f, "unknown record field: `{field}`"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One record exactly as the store returns it.
///
/// `comments` may be a JSON-encoded string or a structured array depending on
/// which client wrote it last. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Value>,
}

/// Field names a record carries; patches may only name these.
pub const RECORD_FIELDS: &[&str] = &[
    "id",
    "title",
    "content",
    "category",
    "timestamp",
    "likes",
    "comments",
];

/// Remote flat-record collection.
pub trait RecordStore {
    /// Returns the full collection snapshot.
    fn list_all(&self) -> StoreResult<Vec<RawRecord>>;
    /// Overwrites the named fields of one record.
    fn patch_by_id(&self, id: &str, fields: &FieldPatch) -> StoreResult<()>;
    /// Appends one record to the collection.
    fn create(&self, record: &RawRecord) -> StoreResult<()>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn list_all(&self) -> StoreResult<Vec<RawRecord>> {
        (**self).list_all()
    }

    fn patch_by_id(&self, id: &str, fields: &FieldPatch) -> StoreResult<()> {
        (**self).patch_by_id(id, fields)
    }

    fn create(&self, record: &RawRecord) -> StoreResult<()> {
        (**self).create(record)
    }
}

/// Rejects patch keys outside [`RECORD_FIELDS`].
pub fn validate_patch_fields(fields: &FieldPatch) -> StoreResult<()> {
    match fields
        .keys()
        .find(|key| !RECORD_FIELDS.contains(&key.as_str()))
    {
        Some(unknown) => Err(StoreError::UnknownField(unknown.clone())),
        None => Ok(()),
    }
}
