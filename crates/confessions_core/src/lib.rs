//! Core domain logic for the confessions feed.
//! Owns the feed model, record stores, the like ledger and the optimistic
//! mutation coordinator; presentation layers only call into this crate.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::comment::{Comment, CommentId};
pub use model::confession::{Confession, ConfessionId};
pub use repo::http_record_store::HttpRecordStore;
pub use repo::ledger_repo::{LedgerRepository, RepoError, RepoResult, SqliteLedgerRepository};
pub use repo::record_store::{FieldPatch, RawRecord, RecordStore, StoreError, StoreResult};
pub use repo::sqlite_record_store::SqliteRecordStore;
pub use service::coordinator::{CoordinatorError, MutationCoordinator, NewConfession};
pub use service::like_ledger::LikeLedger;
pub use service::optimistic::{MutationOutcome, MutationTicket, RemoteWrite};
pub use service::session::{DraftTarget, Notice, NoticeKind, ViewSession};

/// Liveness probe for embedding layers.
pub fn ping() -> &'static str {
    "pong"
}

/// Version of this crate.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
