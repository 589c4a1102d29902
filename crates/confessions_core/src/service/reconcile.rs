//! Per-record reconciliation of overlapping optimistic writes.
//!
//! # Responsibility
//! - Remember, per record, the last field value the store accepted.
//! - Rebuild the visible value as that baseline plus every still-pending
//!   mutation, in staging order, whenever one of them settles.
//!
//! # Invariants
//! - A rejected write removes only its own effect; newer pending writes stay
//!   visible.
//! - A confirmed write moves the baseline to the value it sent.
//! - With nothing pending the visible value equals the baseline.

use crate::model::comment::{find_comment, insert_reply, Comment};
use crate::service::optimistic::MutationTicket;

/// Like counter plus this device's membership for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub likes: u64,
    pub liked: bool,
}

impl LikeState {
    /// State after one like toggle. Unliking at zero stays at zero.
    pub fn toggled(self) -> Self {
        let likes = if self.liked {
            self.likes.saturating_sub(1)
        } else {
            self.likes + 1
        };
        Self {
            likes,
            liked: !self.liked,
        }
    }
}

/// Pending like toggles on one record.
#[derive(Debug)]
pub struct LikeTrack {
    confirmed: LikeState,
    pending: Vec<MutationTicket>,
}

impl LikeTrack {
    pub fn new(confirmed: LikeState) -> Self {
        Self {
            confirmed,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, ticket: MutationTicket) {
        self.pending.push(ticket);
    }

    /// Store accepted `ticket` with `written`. Returns the visible state.
    pub fn confirm(&mut self, ticket: MutationTicket, written: LikeState) -> LikeState {
        self.pending.retain(|pending| *pending != ticket);
        self.confirmed = written;
        self.projected()
    }

    /// Store rejected `ticket`. Returns the visible state.
    pub fn reject(&mut self, ticket: MutationTicket) -> LikeState {
        self.pending.retain(|pending| *pending != ticket);
        self.projected()
    }

    pub fn projected(&self) -> LikeState {
        self.pending
            .iter()
            .fold(self.confirmed, |state, _| state.toggled())
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// One staged comment or reply.
#[derive(Debug, Clone)]
pub struct PendingInsert {
    /// `None` for a top-level comment.
    pub parent_id: Option<String>,
    pub comment: Comment,
}

/// Pending comment inserts on one record.
#[derive(Debug)]
pub struct CommentTrack {
    confirmed: Vec<Comment>,
    pending: Vec<(MutationTicket, PendingInsert)>,
}

impl CommentTrack {
    pub fn new(confirmed: Vec<Comment>) -> Self {
        Self {
            confirmed,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, ticket: MutationTicket, insert: PendingInsert) {
        self.pending.push((ticket, insert));
    }

    /// Store accepted `ticket` with the whole tree `written`.
    pub fn confirm(&mut self, ticket: MutationTicket, written: Vec<Comment>) -> Vec<Comment> {
        self.pending.retain(|(pending, _)| *pending != ticket);
        self.confirmed = written;
        self.projected()
    }

    /// Store rejected `ticket`. Returns the visible tree.
    pub fn reject(&mut self, ticket: MutationTicket) -> Vec<Comment> {
        self.pending.retain(|(pending, _)| *pending != ticket);
        self.projected()
    }

    /// Baseline with pending inserts replayed.
    ///
    /// Inserts already present in the baseline are skipped. A reply whose
    /// parent is gone is dropped.
    pub fn projected(&self) -> Vec<Comment> {
        let mut tree = self.confirmed.clone();
        for (_, insert) in &self.pending {
            if find_comment(&tree, &insert.comment.id).is_some() {
                continue;
            }
            match &insert.parent_id {
                None => tree.push(insert.comment.clone()),
                Some(parent_id) => {
                    if let Some(updated) = insert_reply(&tree, parent_id, insert.comment.clone()) {
                        tree = updated;
                    }
                }
            }
        }
        tree
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
