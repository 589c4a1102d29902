//! Per-view session state.
//!
//! # Responsibility
//! - Hold UI-facing state keyed by record/comment id: drafts, expanded
//!   entries, the active reply target and the selected category.
//! - Carry one transient notice describing the latest failed operation.
//!
//! # Invariants
//! - State lives only as long as the view session; nothing here persists.
//! - Drafts are cleared only by an explicit clear or a confirmed write.

use crate::model::confession::{Confession, ALL_CATEGORIES};
use std::collections::{HashMap, HashSet};

/// Number of content lines shown before a confession is expanded.
pub const PREVIEW_LINES: usize = 3;

/// Input box a draft belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DraftTarget {
    /// Top-level comment box of a confession.
    Comment { confession_id: String },
    /// Reply box under one comment.
    Reply {
        confession_id: String,
        comment_id: String,
    },
}

impl DraftTarget {
    pub fn comment(confession_id: impl Into<String>) -> Self {
        Self::Comment {
            confession_id: confession_id.into(),
        }
    }

    pub fn reply(confession_id: impl Into<String>, comment_id: impl Into<String>) -> Self {
        Self::Reply {
            confession_id: confession_id.into(),
            comment_id: comment_id.into(),
        }
    }

    pub fn confession_id(&self) -> &str {
        match self {
            Self::Comment { confession_id } | Self::Reply { confession_id, .. } => confession_id,
        }
    }
}

/// What kind of operation a notice reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    LoadFailed,
    LikeFailed,
    CommentFailed,
    PublishFailed,
}

/// Transient, user-visible failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub record_id: Option<String>,
    pub message: String,
}

impl Notice {
    pub(crate) fn new(kind: NoticeKind, record_id: Option<&str>) -> Self {
        let message = match kind {
            NoticeKind::LoadFailed => "Could not load confessions.",
            NoticeKind::LikeFailed => "Could not save your like. Please try again.",
            NoticeKind::CommentFailed => "Error adding comment. Please try again.",
            NoticeKind::PublishFailed => "Error submitting confession. Please try again.",
        };
        Self {
            kind,
            record_id: record_id.map(str::to_string),
            message: message.to_string(),
        }
    }
}

/// Explicit state for one feed view.
#[derive(Debug, Clone)]
pub struct ViewSession {
    drafts: HashMap<DraftTarget, String>,
    expanded: HashSet<String>,
    reply_target: Option<DraftTarget>,
    category: String,
    notice: Option<Notice>,
}

impl Default for ViewSession {
    fn default() -> Self {
        Self {
            drafts: HashMap::new(),
            expanded: HashSet::new(),
            reply_target: None,
            category: ALL_CATEGORIES.to_string(),
            notice: None,
        }
    }
}

impl ViewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_draft(&mut self, target: DraftTarget, text: impl Into<String>) {
        self.drafts.insert(target, text.into());
    }

    pub fn draft(&self, target: &DraftTarget) -> Option<&str> {
        self.drafts.get(target).map(String::as_str)
    }

    pub fn clear_draft(&mut self, target: &DraftTarget) {
        self.drafts.remove(target);
    }

    /// Flips expansion of one confession. Returns the new state.
    pub fn toggle_expanded(&mut self, confession_id: &str) -> bool {
        if self.expanded.remove(confession_id) {
            return false;
        }
        self.expanded.insert(confession_id.to_string());
        true
    }

    pub fn is_expanded(&self, confession_id: &str) -> bool {
        self.expanded.contains(confession_id)
    }

    /// Content as it should be displayed given expansion state.
    pub fn display_content(&self, confession: &Confession) -> String {
        if self.is_expanded(&confession.id) {
            return confession.content.clone();
        }
        confession.preview(PREVIEW_LINES)
    }

    /// Whether a "Read more" affordance applies: collapsed and cut short.
    pub fn has_more(&self, confession: &Confession) -> bool {
        !self.is_expanded(&confession.id) && confession.is_truncatable(PREVIEW_LINES)
    }

    /// Opens the reply box under one comment, closing any other.
    pub fn start_reply(&mut self, confession_id: &str, comment_id: &str) {
        self.reply_target = Some(DraftTarget::reply(confession_id, comment_id));
    }

    pub fn cancel_reply(&mut self) {
        self.reply_target = None;
    }

    pub fn reply_target(&self) -> Option<&DraftTarget> {
        self.reply_target.as_ref()
    }

    /// Stores the category selection, normalized like record tags.
    pub fn select_category(&mut self, category: &str) {
        let normalized = category.trim().to_lowercase();
        self.category = if normalized.is_empty() {
            ALL_CATEGORIES.to_string()
        } else {
            normalized
        };
    }

    pub fn selected_category(&self) -> &str {
        &self.category
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Returns and clears the current notice.
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    pub(crate) fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }
}
