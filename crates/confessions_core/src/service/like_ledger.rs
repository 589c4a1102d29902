//! Device-local like ledger.
//!
//! # Responsibility
//! - Track which records this device has liked, across restarts.
//! - Decide increment vs. decrement for a like toggle.
//!
//! # Invariants
//! - The persisted list is rewritten after every mutating call.
//! - A failed write leaves in-memory membership exactly as before the call.
//! - Membership only reflects this device's own toggles.

use crate::repo::ledger_repo::{LedgerRepository, RepoError, RepoResult};
use log::{info, warn};

/// Set of liked record ids backed by a ledger repository.
pub struct LikeLedger<L: LedgerRepository> {
    repo: L,
    liked: Vec<String>,
}

impl<L: LedgerRepository> LikeLedger<L> {
    /// Reads the persisted ledger.
    ///
    /// Undecodable persisted data is discarded with a warning and the ledger
    /// starts empty; storage failures are returned.
    pub fn load(repo: L) -> RepoResult<Self> {
        let liked = match repo.load_liked() {
            Ok(ids) => dedup_preserving_order(ids),
            Err(RepoError::InvalidData(message)) => {
                warn!(
                    "event=ledger_load module=ledger status=recovered reason=invalid_data detail={message}"
                );
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        info!(
            "event=ledger_load module=ledger status=ok count={}",
            liked.len()
        );
        Ok(Self { repo, liked })
    }

    pub fn is_liked(&self, record_id: &str) -> bool {
        self.liked.iter().any(|id| id == record_id)
    }

    /// Liked ids in the order they were liked.
    pub fn liked_ids(&self) -> &[String] {
        &self.liked
    }

    /// Flips membership and persists. Returns the new membership.
    pub fn toggle(&mut self, record_id: &str) -> RepoResult<bool> {
        let now_liked = !self.is_liked(record_id);
        self.set_liked(record_id, now_liked)?;
        Ok(now_liked)
    }

    /// Forces membership to `liked` and persists.
    ///
    /// A no-op change still rewrites the stored list.
    pub fn set_liked(&mut self, record_id: &str, liked: bool) -> RepoResult<()> {
        let previous = self.liked.clone();
        if liked {
            if !self.is_liked(record_id) {
                self.liked.push(record_id.to_string());
            }
        } else {
            self.liked.retain(|id| id != record_id);
        }

        if let Err(err) = self.repo.save_liked(&self.liked) {
            self.liked = previous;
            warn!("event=ledger_save module=ledger status=error error={err}");
            return Err(err);
        }
        Ok(())
    }
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
