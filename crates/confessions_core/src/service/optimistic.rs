//! Optimistic apply / confirm / revert bookkeeping.
//!
//! # Responsibility
//! - Hold every remote write produced by an already-applied local mutation
//!   together with its confirm and revert effects.
//! - Run exactly one of those effects when the write's outcome is known.
//!
//! # Invariants
//! - A staged write is settled at most once; settling removes it.
//! - Writes leave the dispatch queue in FIFO order unless taken by ticket.
//! - Effects only touch the state they were staged against; they never
//!   call the store.

use crate::repo::record_store::{FieldPatch, StoreResult};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};

/// State transition run once a write settles.
pub type Effect<C> = Box<dyn FnOnce(&mut C)>;

/// Handle of one staged remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationTicket(u64);

#[cfg(test)]
impl MutationTicket {
    pub(crate) fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl Display for MutationTicket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Field family a write overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Like,
    Comment,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
        }
    }
}

/// Partial update to send for one applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub ticket: MutationTicket,
    pub kind: MutationKind,
    pub record_id: String,
    pub fields: FieldPatch,
}

/// How a staged write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Store accepted the write.
    Confirmed,
    /// Store rejected the write; its local effect was removed.
    RolledBack { reason: String },
}

struct StagedWrite<C> {
    write: RemoteWrite,
    on_confirm: Effect<C>,
    on_revert: Effect<C>,
}

/// Staged writes awaiting dispatch or settlement.
pub struct PendingWrites<C> {
    staged: BTreeMap<MutationTicket, StagedWrite<C>>,
    queue: VecDeque<MutationTicket>,
    next_ticket: u64,
}

impl<C> Default for PendingWrites<C> {
    fn default() -> Self {
        Self {
            staged: BTreeMap::new(),
            queue: VecDeque::new(),
            next_ticket: 1,
        }
    }
}

impl<C> PendingWrites<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket the next [`Self::stage`] call will hand out.
    pub fn next_ticket(&self) -> MutationTicket {
        MutationTicket(self.next_ticket)
    }

    /// Records a write whose local effect has already been applied.
    pub fn stage(
        &mut self,
        kind: MutationKind,
        record_id: impl Into<String>,
        fields: FieldPatch,
        on_confirm: Effect<C>,
        on_revert: Effect<C>,
    ) -> MutationTicket {
        let ticket = MutationTicket(self.next_ticket);
        self.next_ticket += 1;
        let write = RemoteWrite {
            ticket,
            kind,
            record_id: record_id.into(),
            fields,
        };
        self.staged.insert(
            ticket,
            StagedWrite {
                write,
                on_confirm,
                on_revert,
            },
        );
        self.queue.push_back(ticket);
        ticket
    }

    /// Staged writes, dispatched or not.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Tickets not yet handed out for dispatch, oldest first.
    pub fn queued(&self) -> Vec<MutationTicket> {
        self.queue.iter().copied().collect()
    }

    pub fn next_queued(&self) -> Option<MutationTicket> {
        self.queue.front().copied()
    }

    pub fn write(&self, ticket: MutationTicket) -> Option<&RemoteWrite> {
        self.staged.get(&ticket).map(|staged| &staged.write)
    }

    /// Hands a queued write out for dispatch. It stays staged until settled.
    pub fn take_write(&mut self, ticket: MutationTicket) -> Option<RemoteWrite> {
        let position = self.queue.iter().position(|queued| *queued == ticket)?;
        self.queue.remove(position);
        self.write(ticket).cloned()
    }

    /// Runs the confirm or revert effect for `ticket` against `ctx`.
    ///
    /// Returns `None` when the ticket is unknown or already settled.
    pub fn settle(
        &mut self,
        ticket: MutationTicket,
        ctx: &mut C,
        outcome: StoreResult<()>,
    ) -> Option<MutationOutcome> {
        let staged = self.staged.remove(&ticket)?;
        self.queue.retain(|queued| *queued != ticket);

        Some(match outcome {
            Ok(()) => {
                (staged.on_confirm)(ctx);
                MutationOutcome::Confirmed
            }
            Err(err) => {
                (staged.on_revert)(ctx);
                MutationOutcome::RolledBack {
                    reason: err.to_string(),
                }
            }
        })
    }
}
