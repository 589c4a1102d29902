//! Confession domain model.
//!
//! # Responsibility
//! - Define the canonical feed entry produced by the loader.
//! - Hold the static category taxonomy used by filters and labels.
//!
//! # Invariants
//! - `category` is always a lowercase, non-blank tag.
//! - `timestamp` is never mutated after creation.
//! - `likes` is non-negative by construction.

use crate::model::comment::Comment;
use serde::{Deserialize, Serialize};

/// Stable external identifier of a confession record.
pub type ConfessionId = String;

/// Tag assigned when a record carries no usable category.
pub const DEFAULT_CATEGORY: &str = "general";

/// Title assigned when a record carries none.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Body assigned when a record carries none.
pub const DEFAULT_CONTENT: &str = "No content";

/// Category selection that disables filtering.
pub const ALL_CATEGORIES: &str = "all";

/// Known category tags and their display labels.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("general", "General"),
    ("personal", "Personal Growth"),
    ("relationships", "Relationships"),
    ("family", "Family"),
    ("work", "Work"),
    ("health", "Health"),
    ("other", "Other"),
];

/// One feed entry with its like counter and comment tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confession {
    pub id: ConfessionId,
    pub title: String,
    /// Free text; embedded newlines are preserved.
    pub content: String,
    pub category: String,
    /// ISO creation time as stored remotely.
    pub timestamp: String,
    pub likes: u64,
    pub comments: Vec<Comment>,
    /// Record carried no id of its own; `id` is its snapshot position and
    /// must never address a remote write.
    #[serde(default)]
    pub local_only: bool,
}

impl Confession {
    /// Returns at most `max_lines` lines of content, suffixed with `...` when cut.
    pub fn preview(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.content.split('\n').collect();
        if lines.len() <= max_lines {
            return self.content.clone();
        }
        format!("{}...", lines[..max_lines].join("\n"))
    }

    /// Whether the content is long enough for a collapsed preview.
    pub fn is_truncatable(&self, max_lines: usize) -> bool {
        self.content.split('\n').count() > max_lines
    }
}

/// Normalizes a raw category value to its lowercase tag.
pub fn normalize_category(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_lowercase(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Looks up the display label of a known tag.
pub fn category_label(tag: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(known, _)| *known == tag)
        .map(|(_, label)| *label)
}
