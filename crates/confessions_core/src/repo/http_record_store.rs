//! REST-backed record store client.
//!
//! # Responsibility
//! - Talk to a spreadsheet-style REST collection (`GET` all rows,
//!   `PATCH /id/{id}` for named fields, `POST {"data": [...]}` to append).
//! - Map every failure into [`StoreError`] without retrying.
//!
//! # Invariants
//! - Every request is bounded by the configured timeout.
//! - Record ids are only placed into URLs after passing [`is_addressable_id`].

use crate::repo::record_store::{
    validate_patch_fields, FieldPatch, RawRecord, RecordStore, StoreError, StoreResult,
};
use log::{debug, warn};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// HTTP client for the remote confession collection.
pub struct HttpRecordStore {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpRecordStore {
    /// Creates a client for the collection at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self { agent, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn record_url(&self, id: &str) -> StoreResult<String> {
        if !is_addressable_id(id) {
            return Err(StoreError::InvalidRecordId(id.to_string()));
        }
        Ok(format!("{}/id/{id}", self.base_url))
    }
}

impl RecordStore for HttpRecordStore {
    fn list_all(&self) -> StoreResult<Vec<RawRecord>> {
        let started_at = Instant::now();
        let response = self
            .agent
            .get(&self.base_url)
            .call()
            .map_err(|err| log_failure("list_all", started_at, map_ureq_error(err)))?;

        let records = response
            .into_json::<Vec<RawRecord>>()
            .map_err(|err| log_failure("list_all", started_at, StoreError::Decode(err.to_string())))?;

        debug!(
            "event=store_request module=http_store op=list_all status=ok count={} duration_ms={}",
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    fn patch_by_id(&self, id: &str, fields: &FieldPatch) -> StoreResult<()> {
        validate_patch_fields(fields)?;
        let url = self.record_url(id)?;
        let started_at = Instant::now();

        self.agent
            .request("PATCH", &url)
            .send_json(Value::Object(fields.clone()))
            .map_err(|err| log_failure("patch_by_id", started_at, map_ureq_error(err)))?;

        debug!(
            "event=store_request module=http_store op=patch_by_id status=ok fields={} duration_ms={}",
            fields.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn create(&self, record: &RawRecord) -> StoreResult<()> {
        let started_at = Instant::now();

        self.agent
            .post(&self.base_url)
            .send_json(json!({ "data": [record] }))
            .map_err(|err| log_failure("create", started_at, map_ureq_error(err)))?;

        debug!(
            "event=store_request module=http_store op=create status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Whether `id` can be embedded as one URL path segment without escaping.
/// Dot segments (`.`, `..`, `...`) are refused.
pub fn is_addressable_id(id: &str) -> bool {
    !id.is_empty()
        && !id.chars().all(|c| c == '.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

fn map_ureq_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(code, response) => StoreError::Status {
            code,
            message: response.status_text().to_string(),
        },
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}

fn log_failure(op: &'static str, started_at: Instant, err: StoreError) -> StoreError {
    warn!(
        "event=store_request module=http_store op={op} status=error duration_ms={} error={err}",
        started_at.elapsed().as_millis()
    );
    err
}
