//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the record store contract the core needs from the remote
//!   collection, with HTTP and SQLite implementations.
//! - Persist device-local state (the like ledger) behind a small trait.
//!
//! # Invariants
//! - Store calls report success or failure only; callers own reconciliation.
//! - Repository constructors reject connections that were not migrated.

pub mod http_record_store;
pub mod ledger_repo;
pub mod record_store;
pub mod sqlite_record_store;
