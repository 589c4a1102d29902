//! Like ledger persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the device's liked-record ids under one key of `kv_store`.
//! - Keep serialization details (JSON array, insertion order) inside the
//!   repository boundary.
//!
//! # Invariants
//! - Exactly one key (`liked_confessions`) is read or written.
//! - Saving replaces the whole list; there are no partial updates.

use crate::db::{ensure_migrated, DbError};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key under which the ledger is stored.
pub const LIKED_LEDGER_KEY: &str = "liked_confessions";

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for device-local repository operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Persisted value cannot be decoded.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage for the ordered list of liked record ids.
pub trait LedgerRepository {
    /// Returns stored ids in insertion order; empty when never saved.
    fn load_liked(&self) -> RepoResult<Vec<String>>;
    /// Replaces the stored list.
    fn save_liked(&self, ids: &[String]) -> RepoResult<()>;
}

impl<T: LedgerRepository + ?Sized> LedgerRepository for &T {
    fn load_liked(&self) -> RepoResult<Vec<String>> {
        (**self).load_liked()
    }

    fn save_liked(&self, ids: &[String]) -> RepoResult<()> {
        (**self).save_liked(ids)
    }
}

/// SQLite-backed ledger repository.
pub struct SqliteLedgerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedgerRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_migrated(conn)?;
        Ok(Self { conn })
    }
}

impl LedgerRepository for SqliteLedgerRepository<'_> {
    fn load_liked(&self) -> RepoResult<Vec<String>> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1;",
                [LIKED_LEDGER_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(json) => serde_json::from_str(&json).map_err(|err| {
                RepoError::InvalidData(format!("`{LIKED_LEDGER_KEY}` is not a string list: {err}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    fn save_liked(&self, ids: &[String]) -> RepoResult<()> {
        let json = serde_json::to_string(ids)
            .map_err(|err| RepoError::InvalidData(format!("cannot encode ledger: {err}")))?;
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![LIKED_LEDGER_KEY, json],
        )?;
        Ok(())
    }
}
