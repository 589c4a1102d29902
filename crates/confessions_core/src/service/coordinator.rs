//! Optimistic mutation coordinator.
//!
//! # Responsibility
//! - Own the in-memory feed, the like ledger and the view session.
//! - Apply like toggles and new comments/replies immediately, stage the
//!   matching remote write, and reconcile when the write settles.
//! - Load the feed and publish new confessions through the record store.
//!
//! # Invariants
//! - A mutation is either fully applied and staged, or nothing changed.
//! - A rejected write removes only its own effect: the record shows the
//!   last store-accepted value with every still-pending mutation replayed.
//! - Records without an id of their own are never written remotely.
//! - Writes are never retried automatically.
//! - Overlapping whole-field comment writes to one record are not
//!   serialized; the later write wins on the store.

use crate::model::comment::{insert_reply, Comment, ANONYMOUS_AUTHOR};
use crate::model::confession::{
    normalize_category, Confession, ConfessionId, DEFAULT_TITLE,
};
use crate::model::timestamp::now_iso;
use crate::repo::ledger_repo::{LedgerRepository, RepoError};
use crate::repo::record_store::{FieldPatch, RawRecord, RecordStore, StoreError, StoreResult};
use crate::service::feed_filter::filter_by_category;
use crate::service::feed_loader::{encode_comments_field, load_feed, normalize_record};
use crate::service::like_ledger::LikeLedger;
use crate::service::optimistic::{
    MutationKind, MutationOutcome, MutationTicket, PendingWrites, RemoteWrite,
};
use crate::service::reconcile::{CommentTrack, LikeState, LikeTrack, PendingInsert};
use crate::service::session::{DraftTarget, Notice, NoticeKind, ViewSession};
use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors for coordinator intents whose preconditions fail.
///
/// Store failures of staged writes are not errors here; they settle as
/// [`MutationOutcome::RolledBack`].
#[derive(Debug)]
pub enum CoordinatorError {
    /// No confession with this id is in the feed.
    ConfessionNotFound(String),
    /// Reply parent is not in the confession's tree.
    CommentNotFound {
        confession_id: String,
        comment_id: String,
    },
    /// Record has no id of its own, so it cannot be written remotely.
    LocalOnly(String),
    /// Ticket was never staged, already settled, or already dispatched.
    UnknownTicket(MutationTicket),
    /// Ledger could not be persisted; nothing was applied.
    Ledger(RepoError),
    /// Synchronous store call (load or publish) failed.
    Store(StoreError),
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfessionNotFound(id) => write!(f, "confession not found: {id}"),
            Self::CommentNotFound {
                confession_id,
                comment_id,
            } => write!(
                f,
                "comment {comment_id} not found under confession {confession_id}"
            ),
            Self::LocalOnly(id) => write!(f, "confession {id} has no remote id"),
            Self::UnknownTicket(ticket) => write!(f, "no pending write for ticket {ticket}"),
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

/// Input for publishing a new confession.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewConfession {
    pub title: String,
    pub content: String,
    pub category: String,
}

/// Mutable state that staged effects act on.
pub struct FeedState<L: LedgerRepository> {
    feed: Vec<Confession>,
    ledger: LikeLedger<L>,
    session: ViewSession,
    like_tracks: HashMap<ConfessionId, LikeTrack>,
    comment_tracks: HashMap<ConfessionId, CommentTrack>,
}

impl<L: LedgerRepository> FeedState<L> {
    fn confession_mut(&mut self, id: &str) -> Option<&mut Confession> {
        self.feed.iter_mut().find(|confession| confession.id == id)
    }

    /// Settles one like write and shows the reconciled counter and membership.
    fn reconcile_likes(
        &mut self,
        record_id: &str,
        settle: impl FnOnce(&mut LikeTrack) -> LikeState,
    ) {
        let Some(track) = self.like_tracks.get_mut(record_id) else {
            return;
        };
        let visible = settle(track);
        if track.is_idle() {
            self.like_tracks.remove(record_id);
        }

        if let Some(confession) = self.confession_mut(record_id) {
            confession.likes = visible.likes;
        }
        if self.ledger.is_liked(record_id) != visible.liked {
            if let Err(err) = self.ledger.set_liked(record_id, visible.liked) {
                warn!(
                    "event=like_reconcile module=coordinator status=error record_id={record_id} error={err}"
                );
            }
        }
    }

    /// Settles one comment write and shows the reconciled tree.
    fn reconcile_comments(
        &mut self,
        record_id: &str,
        settle: impl FnOnce(&mut CommentTrack) -> Vec<Comment>,
    ) {
        let Some(track) = self.comment_tracks.get_mut(record_id) else {
            return;
        };
        let visible = settle(track);
        if track.is_idle() {
            self.comment_tracks.remove(record_id);
        }

        if let Some(confession) = self.confession_mut(record_id) {
            confession.comments = visible;
        }
    }
}

/// Feed owner applying optimistic mutations against a record store.
pub struct MutationCoordinator<S: RecordStore, L: LedgerRepository> {
    store: S,
    state: FeedState<L>,
    pending: PendingWrites<FeedState<L>>,
    ids: TimeIdSource,
    author: String,
}

impl<S: RecordStore, L: LedgerRepository> MutationCoordinator<S, L> {
    /// Creates a coordinator with an empty feed. Call [`Self::load`] to fill it.
    pub fn new(store: S, ledger: LikeLedger<L>) -> Self {
        Self {
            store,
            state: FeedState {
                feed: Vec::new(),
                ledger,
                session: ViewSession::new(),
                like_tracks: HashMap::new(),
                comment_tracks: HashMap::new(),
            },
            pending: PendingWrites::new(),
            ids: TimeIdSource::default(),
            author: ANONYMOUS_AUTHOR.to_string(),
        }
    }

    /// Sets the author label written on new comments. Blank means anonymous.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.author = if author.trim().is_empty() {
            ANONYMOUS_AUTHOR.to_string()
        } else {
            author.trim().to_string()
        };
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Replaces the feed with a fresh store snapshot.
    ///
    /// On failure the previous feed is kept and a load notice is set.
    pub fn load(&mut self) -> Result<usize, CoordinatorError> {
        match load_feed(&self.store) {
            Ok(feed) => {
                self.state.feed = feed;
                Ok(self.state.feed.len())
            }
            Err(err) => {
                self.state
                    .session
                    .set_notice(Notice::new(NoticeKind::LoadFailed, None));
                Err(CoordinatorError::Store(err))
            }
        }
    }

    pub fn feed(&self) -> &[Confession] {
        &self.state.feed
    }

    pub fn confession(&self, id: &str) -> Option<&Confession> {
        self.state.feed.iter().find(|confession| confession.id == id)
    }

    /// Feed narrowed by the session's selected category.
    pub fn visible_feed(&self) -> Vec<&Confession> {
        filter_by_category(&self.state.feed, self.state.session.selected_category())
    }

    pub fn is_liked(&self, confession_id: &str) -> bool {
        self.state.ledger.is_liked(confession_id)
    }

    pub fn session(&self) -> &ViewSession {
        &self.state.session
    }

    pub fn session_mut(&mut self) -> &mut ViewSession {
        &mut self.state.session
    }

    /// Number of staged writes not yet settled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Tickets waiting for dispatch, oldest first.
    pub fn queued_tickets(&self) -> Vec<MutationTicket> {
        self.pending.queued()
    }

    pub fn pending_write(&self, ticket: MutationTicket) -> Option<&RemoteWrite> {
        self.pending.write(ticket)
    }

    /// Likes or unlikes a confession for this device.
    ///
    /// # Contract
    /// - Counter and ledger change before this returns.
    /// - Stages `{ "likes": <new value> }` for the record.
    /// - On rejection only this toggle is undone; newer pending toggles on
    ///   the same record stay applied.
    pub fn toggle_like(&mut self, confession_id: &str) -> Result<MutationTicket, CoordinatorError> {
        let current = LikeState {
            likes: self.writable(confession_id)?.likes,
            liked: self.state.ledger.is_liked(confession_id),
        };
        let next = current.toggled();

        self.state
            .ledger
            .set_liked(confession_id, next.liked)
            .map_err(CoordinatorError::Ledger)?;
        if let Some(confession) = self.state.confession_mut(confession_id) {
            confession.likes = next.likes;
        }

        let mut fields = FieldPatch::new();
        fields.insert("likes".to_string(), Value::from(next.likes));
        let record_id = confession_id.to_string();
        let ticket = self.pending.next_ticket();
        self.state
            .like_tracks
            .entry(record_id.clone())
            .or_insert_with(|| LikeTrack::new(current))
            .push(ticket);

        let confirm_id = record_id.clone();
        self.pending.stage(
            MutationKind::Like,
            record_id.clone(),
            fields,
            Box::new(move |state: &mut FeedState<L>| {
                state.reconcile_likes(&confirm_id, |track| track.confirm(ticket, next));
            }),
            Box::new(move |state: &mut FeedState<L>| {
                state.reconcile_likes(&record_id, |track| track.reject(ticket));
                state
                    .session
                    .set_notice(Notice::new(NoticeKind::LikeFailed, Some(&record_id)));
            }),
        );

        info!(
            "event=like_toggle module=coordinator status=applied record_id={confession_id} liked={} likes={} ticket={ticket}",
            next.liked, next.likes
        );
        Ok(ticket)
    }

    /// Appends a top-level comment. Blank text is a no-op returning `None`.
    pub fn post_comment(
        &mut self,
        confession_id: &str,
        text: &str,
    ) -> Result<Option<MutationTicket>, CoordinatorError> {
        self.post(DraftTarget::comment(confession_id), text)
    }

    /// Adds a reply under `parent_comment_id` at any depth. Blank text is a
    /// no-op returning `None`.
    pub fn post_reply(
        &mut self,
        confession_id: &str,
        parent_comment_id: &str,
        text: &str,
    ) -> Result<Option<MutationTicket>, CoordinatorError> {
        self.post(DraftTarget::reply(confession_id, parent_comment_id), text)
    }

    /// Posts whatever the session holds as draft for `target`.
    pub fn submit_draft(
        &mut self,
        target: &DraftTarget,
    ) -> Result<Option<MutationTicket>, CoordinatorError> {
        let text = self
            .state
            .session
            .draft(target)
            .unwrap_or_default()
            .to_string();
        self.post(target.clone(), &text)
    }

    /// Sends one queued write to the store and settles it.
    pub fn dispatch(&mut self, ticket: MutationTicket) -> Result<MutationOutcome, CoordinatorError> {
        let write = self
            .pending
            .take_write(ticket)
            .ok_or(CoordinatorError::UnknownTicket(ticket))?;
        let outcome = self.store.patch_by_id(&write.record_id, &write.fields);
        self.settle(ticket, outcome)
    }

    /// Dispatches every queued write in staging order.
    pub fn run_pending(&mut self) -> Vec<(MutationTicket, MutationOutcome)> {
        let mut settled = Vec::new();
        while let Some(ticket) = self.pending.next_queued() {
            match self.dispatch(ticket) {
                Ok(outcome) => settled.push((ticket, outcome)),
                Err(err) => {
                    warn!("event=dispatch module=coordinator status=error ticket={ticket} error={err}");
                    break;
                }
            }
        }
        settled
    }

    /// Hands a queued write to an external executor. Report its result with
    /// [`Self::settle`].
    pub fn take_write(&mut self, ticket: MutationTicket) -> Option<RemoteWrite> {
        self.pending.take_write(ticket)
    }

    /// Applies the outcome of a staged write: confirm moves the record's
    /// baseline to the written value, failure drops this write's effect and
    /// sets a notice.
    pub fn settle(
        &mut self,
        ticket: MutationTicket,
        outcome: StoreResult<()>,
    ) -> Result<MutationOutcome, CoordinatorError> {
        let kind = self.pending.write(ticket).map(|write| write.kind);
        let settled = self
            .pending
            .settle(ticket, &mut self.state, outcome)
            .ok_or(CoordinatorError::UnknownTicket(ticket))?;

        let kind = kind.map_or("unknown", |kind| kind.as_str());
        match &settled {
            MutationOutcome::Confirmed => info!(
                "event=write_settle module=coordinator status=confirmed kind={kind} ticket={ticket}"
            ),
            MutationOutcome::RolledBack { reason } => warn!(
                "event=write_settle module=coordinator status=rolled_back kind={kind} ticket={ticket} reason={reason}"
            ),
        }
        Ok(settled)
    }

    /// Creates a new confession on the store and prepends it to the feed.
    ///
    /// Blank content is a no-op returning `None`. Unlike likes and comments
    /// this waits for the store: the entry appears only once accepted.
    pub fn publish(
        &mut self,
        draft: &NewConfession,
    ) -> Result<Option<ConfessionId>, CoordinatorError> {
        let content = draft.content.trim();
        if content.is_empty() {
            debug!("event=publish module=coordinator status=skipped reason=empty_content");
            return Ok(None);
        }

        let id = self.ids.next_id();
        let title = match draft.title.trim() {
            "" => DEFAULT_TITLE,
            title => title,
        };
        let record = RawRecord {
            id: Some(json!(id)),
            title: Some(json!(title)),
            content: Some(json!(content)),
            category: Some(json!(normalize_category(Some(draft.category.as_str())))),
            timestamp: Some(json!(now_iso())),
            likes: Some(json!(0)),
            comments: Some(json!("[]")),
        };

        if let Err(err) = self.store.create(&record) {
            warn!("event=publish module=coordinator status=error error={err}");
            self.state
                .session
                .set_notice(Notice::new(NoticeKind::PublishFailed, None));
            return Err(CoordinatorError::Store(err));
        }

        self.state.feed.insert(0, normalize_record(record, 0));
        info!("event=publish module=coordinator status=ok record_id={id}");
        Ok(Some(id))
    }

    fn post(
        &mut self,
        target: DraftTarget,
        text: &str,
    ) -> Result<Option<MutationTicket>, CoordinatorError> {
        let body = text.trim();
        if body.is_empty() {
            debug!("event=comment_post module=coordinator status=skipped reason=empty_text");
            return Ok(None);
        }

        let confession_id = target.confession_id().to_string();
        let current = self.writable(&confession_id)?.comments.clone();
        let comment = Comment::new(self.ids.next_id(), body, self.author.clone(), now_iso());
        let comment_id = comment.id.clone();

        let (updated, parent_id) = match &target {
            DraftTarget::Comment { .. } => {
                let mut tree = current.clone();
                tree.push(comment.clone());
                (tree, None)
            }
            DraftTarget::Reply {
                comment_id: parent_id,
                ..
            } => {
                let tree = insert_reply(&current, parent_id, comment.clone()).ok_or_else(|| {
                    CoordinatorError::CommentNotFound {
                        confession_id: confession_id.clone(),
                        comment_id: parent_id.clone(),
                    }
                })?;
                (tree, Some(parent_id.clone()))
            }
        };

        let mut fields = FieldPatch::new();
        fields.insert("comments".to_string(), encode_comments_field(&updated));
        if let Some(confession) = self.state.confession_mut(&confession_id) {
            confession.comments = updated.clone();
        }

        let ticket = self.pending.next_ticket();
        self.state
            .comment_tracks
            .entry(confession_id.clone())
            .or_insert_with(|| CommentTrack::new(current))
            .push(ticket, PendingInsert { parent_id, comment });

        let record_id = confession_id.clone();
        let confirm_id = confession_id.clone();
        let confirm_target = target.clone();
        self.pending.stage(
            MutationKind::Comment,
            confession_id.clone(),
            fields,
            Box::new(move |state: &mut FeedState<L>| {
                state.reconcile_comments(&confirm_id, |track| track.confirm(ticket, updated));
                state.session.clear_draft(&confirm_target);
                if state.session.reply_target() == Some(&confirm_target) {
                    state.session.cancel_reply();
                }
            }),
            Box::new(move |state: &mut FeedState<L>| {
                state.reconcile_comments(&record_id, |track| track.reject(ticket));
                state
                    .session
                    .set_notice(Notice::new(NoticeKind::CommentFailed, Some(&record_id)));
            }),
        );

        info!(
            "event=comment_post module=coordinator status=applied record_id={confession_id} comment_id={comment_id} reply={} ticket={ticket}",
            matches!(target, DraftTarget::Reply { .. })
        );
        Ok(Some(ticket))
    }

    fn existing(&self, confession_id: &str) -> Result<&Confession, CoordinatorError> {
        self.confession(confession_id)
            .ok_or_else(|| CoordinatorError::ConfessionNotFound(confession_id.to_string()))
    }

    /// Like [`Self::existing`], but refuses records that cannot be patched.
    fn writable(&self, confession_id: &str) -> Result<&Confession, CoordinatorError> {
        let confession = self.existing(confession_id)?;
        if confession.local_only {
            debug!("event=write_refused module=coordinator status=local_only record_id={confession_id}");
            return Err(CoordinatorError::LocalOnly(confession_id.to_string()));
        }
        Ok(confession)
    }
}

/// Time-derived ids, strictly increasing within one coordinator.
#[derive(Debug, Default)]
struct TimeIdSource {
    last: i64,
}

impl TimeIdSource {
    fn next_id(&mut self) -> String {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last.to_string()
    }
}
