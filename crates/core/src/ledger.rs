//! The `ContextLedger` trait — durable, session-scoped context storage.
//!
//! The core is backend-agnostic: any engine offering transactions and indexed
//! lookup by session can implement this trait. The shipped implementation is
//! SQLite (`memwell-ledger`); tests use the same implementation against an
//! in-process database.

use crate::entry::ContextEntry;
use crate::error::LedgerError;
use crate::lineage::LineageRecord;
use crate::session::{Session, SessionMode};
use crate::summary::{Summary, SummaryMethod};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for `create_summary`. The content is produced externally (a model
/// call); the ledger only validates ordering and stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSummary {
    /// Tier index; 0 is the finest layer.
    pub layer: u32,
    pub content: String,
    /// Boundary up to which raw entries are represented.
    pub covers_until: DateTime<Utc>,
    #[serde(default)]
    pub method: SummaryMethod,
}

/// Input for `record_lineage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineage {
    pub response_id: String,
    /// Entry ids in assembled order.
    pub context_entry_ids: Vec<String>,
    /// Summary ids in assembled order.
    pub summary_ids: Vec<String>,
    pub model: String,
    pub mode: SessionMode,
}

/// What a `trim_context` call removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimReport {
    pub entries_removed: usize,
    pub tokens_removed: u64,
    pub tokens_remaining: u64,
}

/// Durable, session-scoped context storage.
///
/// Writes (`add_entry`, `trim_context`, `create_summary`, `record_lineage`)
/// must be serialized per session id by the implementation; reads may run
/// concurrently.
#[async_trait]
pub trait ContextLedger: Send + Sync {
    /// The backend name (e.g. "sqlite").
    fn name(&self) -> &str;

    /// Idempotent schema setup. Failure means the ledger is unavailable;
    /// the working tier continues in degraded mode.
    async fn init(&self) -> Result<(), LedgerError>;

    // --- Sessions ---

    async fn create_session(
        &self,
        mode: SessionMode,
        active_model: &str,
    ) -> Result<Session, LedgerError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, LedgerError>;

    /// Resolve "the current session": the most recently active one, or a
    /// freshly created session when none exists. Callers thread the returned
    /// id explicitly through every subsequent call.
    async fn get_or_create_current_session(
        &self,
        mode: SessionMode,
        active_model: &str,
    ) -> Result<Session, LedgerError>;

    // --- Entries ---

    /// Persist an entry under a session, creating the session row lazily if
    /// needed and bumping its `last_active_at`. An empty entry id is replaced
    /// with a generated one; the assigned id is returned.
    async fn add_entry(
        &self,
        session_id: &str,
        entry: ContextEntry,
    ) -> Result<String, LedgerError>;

    async fn get_entry(&self, id: &str) -> Result<Option<ContextEntry>, LedgerError>;

    /// Explicit delete. Returns whether a row was removed.
    async fn delete_entry(&self, id: &str) -> Result<bool, LedgerError>;

    async fn count_entries(&self, session_id: &str) -> Result<usize, LedgerError>;

    /// Sum of token estimates across a session's entries.
    async fn total_tokens(&self, session_id: &str) -> Result<u64, LedgerError>;

    /// Top `limit` entries by hybrid score (importance/recency), descending;
    /// ties broken by `created_at` descending, then id. Idempotent given
    /// unchanged data, modulo recency decay over elapsed time.
    async fn get_relevant_context(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ContextEntry>, LedgerError>;

    /// Remove lowest-scoring entries until the session's total token
    /// estimate is at or under `target_tokens`, or entries are exhausted.
    /// No-op when already under target.
    async fn trim_context(
        &self,
        session_id: &str,
        target_tokens: u64,
    ) -> Result<TrimReport, LedgerError>;

    // --- Summaries ---

    /// Store an externally produced summary, enforcing the non-decreasing
    /// `covers_until` invariant per (session, layer). Out-of-order
    /// boundaries are rejected with `LedgerError::OutOfOrderSummary`.
    async fn create_summary(
        &self,
        session_id: &str,
        summary: NewSummary,
    ) -> Result<Summary, LedgerError>;

    /// All summaries for a session, layer ascending then recency descending.
    async fn get_summaries(&self, session_id: &str) -> Result<Vec<Summary>, LedgerError>;

    // --- Lineage ---

    /// Append an immutable lineage record. Repeated calls for the same
    /// response id retain older rows for audit.
    async fn record_lineage(
        &self,
        session_id: &str,
        lineage: NewLineage,
    ) -> Result<LineageRecord, LedgerError>;

    /// The latest lineage record for a response id, or `None`.
    async fn get_lineage(&self, response_id: &str) -> Result<Option<LineageRecord>, LedgerError>;
}
