//! Feed loading and record normalization.
//!
//! # Responsibility
//! - Pull the full collection from a record store once per activation.
//! - Turn loosely-typed raw records into canonical `Confession`s.
//! - Order the feed newest first.
//!
//! # Invariants
//! - A malformed `comments` field never fails the load; that record alone
//!   gets an empty tree.
//! - Records with unparseable timestamps sort as the Unix epoch, after every
//!   dated record, keeping their relative input order.
//! - Loading never writes to the store.

use crate::model::comment::Comment;
use crate::model::confession::{
    normalize_category, Confession, DEFAULT_CONTENT, DEFAULT_TITLE,
};
use crate::model::timestamp::ordering_key;
use crate::repo::record_store::{RawRecord, RecordStore, StoreResult};
use log::{error, info, warn};
use serde_json::Value;
use std::cmp::Reverse;
use std::time::Instant;

/// Fetches every record and returns the normalized, ordered feed.
///
/// # Errors
/// - Returns the store error unchanged on transport failure or non-success
///   status.
pub fn load_feed<S: RecordStore + ?Sized>(store: &S) -> StoreResult<Vec<Confession>> {
    let started_at = Instant::now();
    let raw = store.list_all().map_err(|err| {
        error!(
            "event=feed_load module=loader status=error duration_ms={} error={err}",
            started_at.elapsed().as_millis()
        );
        err
    })?;

    let mut feed: Vec<Confession> = raw
        .into_iter()
        .enumerate()
        .map(|(index, record)| normalize_record(record, index))
        .collect();
    sort_by_recency(&mut feed);

    info!(
        "event=feed_load module=loader status=ok count={} duration_ms={}",
        feed.len(),
        started_at.elapsed().as_millis()
    );
    Ok(feed)
}

/// Normalizes one raw record. `index` is its position in the snapshot and
/// becomes the id when the record has none; such records are local-only.
pub fn normalize_record(record: RawRecord, index: usize) -> Confession {
    let own_id = text_field(record.id.as_ref());
    let local_only = own_id.is_none();
    let id = own_id.unwrap_or_else(|| index.to_string());
    if local_only {
        warn!("event=record_id module=loader status=missing index={index}");
    }
    let comments = parse_comments_field(record.comments.as_ref()).unwrap_or_else(|reason| {
        warn!("event=comments_parse module=loader status=recovered record_id={id} reason={reason}");
        Vec::new()
    });

    Confession {
        title: text_field(record.title.as_ref()).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        content: text_field(record.content.as_ref())
            .unwrap_or_else(|| DEFAULT_CONTENT.to_string()),
        category: normalize_category(text_field(record.category.as_ref()).as_deref()),
        timestamp: text_field(record.timestamp.as_ref()).unwrap_or_default(),
        likes: likes_field(record.likes.as_ref()),
        comments,
        id,
        local_only,
    }
}

/// Stable newest-first ordering by parsed timestamp.
pub fn sort_by_recency(feed: &mut [Confession]) {
    feed.sort_by_key(|confession| Reverse(ordering_key(&confession.timestamp)));
}

/// Decodes the embedded comment tree.
///
/// Absent, null and blank-string values are an empty tree. A structured
/// array is used as-is; a string is parsed as JSON. Anything else, or JSON
/// that is not a comment array, is reported as `Err` with a short reason.
pub fn parse_comments_field(value: Option<&Value>) -> Result<Vec<Comment>, String> {
    let decoded = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(text)) if text.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(text)) => {
            serde_json::from_str::<Value>(text).map_err(|err| format!("invalid_json: {err}"))?
        }
        Some(other) => other.clone(),
    };

    if !decoded.is_array() {
        return Err("not_an_array".to_string());
    }
    serde_json::from_value(decoded).map_err(|err| format!("invalid_comment: {err}"))
}

/// Serializes a comment tree the way the store keeps it: as JSON text.
pub fn encode_comments_field(comments: &[Comment]) -> Value {
    // Serializing plain structs with string keys cannot fail.
    Value::String(serde_json::to_string(comments).unwrap_or_else(|_| "[]".to_string()))
}

fn text_field(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    if text.trim().is_empty() {
        return None;
    }
    Some(text)
}

fn likes_field(value: Option<&Value>) -> u64 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(likes) if likes.is_finite() && likes > 0.0 => likes.trunc() as u64,
        _ => 0,
    }
}
