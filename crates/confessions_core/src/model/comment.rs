//! Comment tree model and pure tree operations.
//!
//! # Responsibility
//! - Define the recursive comment/reply shape stored inside a confession.
//! - Locate nodes and insert replies at arbitrary depth by structural copy.
//! - Decode stored nodes leniently: numeric ids, legacy `content` bodies,
//!   null authors and null reply lists.
//! - Derive per-level display ordering without touching canonical order.
//!
//! # Invariants
//! - New nodes are always leaves (`replies` empty) when inserted.
//! - Insert targets the first matching id in depth-first pre-order.
//! - Display ordering is a view; the stored `replies` order never changes.

use crate::model::timestamp::parse_timestamp;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;

/// Author label used when a comment carries none.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// Identifier of one comment, unique within its confession's tree.
pub type CommentId = String;

/// One node in a confession's comment tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredComment")]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author: String,
    pub timestamp: String,
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Creates a leaf comment.
    pub fn new(
        id: impl Into<CommentId>,
        text: impl Into<String>,
        author: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author: author.into(),
            timestamp: timestamp.into(),
            replies: Vec::new(),
        }
    }
}

/// Comment node as found in stored JSON, before normalization.
///
/// Older records stored the body under `content`; some carry both keys.
#[derive(Deserialize)]
struct StoredComment {
    #[serde(default, deserialize_with = "lenient_string")]
    id: CommentId,
    #[serde(default, deserialize_with = "lenient_string")]
    text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    content: String,
    #[serde(default, deserialize_with = "lenient_string")]
    author: String,
    #[serde(default, deserialize_with = "lenient_string")]
    timestamp: String,
    #[serde(default, deserialize_with = "nullable_replies")]
    replies: Vec<Comment>,
}

impl From<StoredComment> for Comment {
    fn from(stored: StoredComment) -> Self {
        let text = if stored.text.trim().is_empty() {
            stored.content
        } else {
            stored.text
        };
        let author = if stored.author.trim().is_empty() {
            ANONYMOUS_AUTHOR.to_string()
        } else {
            stored.author
        };
        Self {
            id: stored.id,
            text,
            author,
            timestamp: stored.timestamp,
            replies: stored.replies,
        }
    }
}

/// Returns a new tree where the first node with `parent_id` gains `reply`.
///
/// Ancestors of the target are rebuilt; every other node is carried over
/// unchanged. Returns `None` when no node matches, in which case nothing has
/// been built and the caller's tree is untouched.
///
/// If two nodes share an id, the first in depth-first pre-order (node before
/// its replies, replies before later siblings) receives the insert.
pub fn insert_reply(tree: &[Comment], parent_id: &str, reply: Comment) -> Option<Vec<Comment>> {
    let mut pending = Some(reply);
    let updated = insert_into(tree, parent_id, &mut pending)?;
    Some(updated)
}

fn insert_into(
    nodes: &[Comment],
    parent_id: &str,
    pending: &mut Option<Comment>,
) -> Option<Vec<Comment>> {
    for (index, node) in nodes.iter().enumerate() {
        let rebuilt = if node.id == parent_id {
            let mut target = node.clone();
            target.replies.extend(pending.take());
            Some(target)
        } else {
            insert_into(&node.replies, parent_id, pending).map(|replies| Comment {
                replies,
                ..node.clone()
            })
        };

        if let Some(rebuilt) = rebuilt {
            let mut level = nodes.to_vec();
            level[index] = rebuilt;
            return Some(level);
        }
    }
    None
}

/// Finds the first node with `id` in depth-first pre-order.
pub fn find_comment<'a>(tree: &'a [Comment], id: &str) -> Option<&'a Comment> {
    for node in tree {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_comment(&node.replies, id) {
            return Some(found);
        }
    }
    None
}

/// Counts every node in the tree, replies included.
pub fn count_comments(tree: &[Comment]) -> usize {
    tree.iter()
        .map(|node| 1 + count_comments(&node.replies))
        .sum()
}

/// Orders one level of comments newest first for rendering.
///
/// Unparseable timestamps sort last. Ties keep their stored order.
pub fn sort_for_display(comments: &[Comment]) -> Vec<&Comment> {
    let mut view: Vec<&Comment> = comments.iter().collect();
    view.sort_by_key(|comment| Reverse(parse_timestamp(&comment.timestamp)));
    view
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got `{other}`"
        ))),
    }
}

fn nullable_replies<'de, D>(deserializer: D) -> Result<Vec<Comment>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Comment>>::deserialize(deserializer)?.unwrap_or_default())
}
