//! Domain model for the confession feed.
//!
//! # Responsibility
//! - Define canonical data structures used by the loader and coordinator.
//! - Keep tree operations pure so mutations can snapshot and restore them.
//!
//! # Invariants
//! - Every confession is identified by a stable external id.
//! - The core never deletes confessions or comments.

pub mod comment;
pub mod confession;
pub mod timestamp;
