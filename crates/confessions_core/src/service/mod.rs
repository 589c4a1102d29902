//! Feed use-case services.
//!
//! # Responsibility
//! - Turn store snapshots into the ordered feed and filtered views.
//! - Apply likes and comments optimistically and reconcile remote outcomes.
//! - Keep presentation layers decoupled from store and ledger details.

pub mod coordinator;
pub mod feed_filter;
pub mod feed_loader;
pub mod like_ledger;
pub mod optimistic;
pub mod reconcile;
pub mod session;
