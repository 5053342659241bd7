//! Context assembly engine.
//!
//! Bridges the two memory tiers: every ingested entry lands in the bounded
//! in-process working store and is mirrored into the durable ledger when one
//! is configured. Assembly produces a ranked, budget-limited context set for
//! a model request; lineage is recorded afterwards so any response can be
//! traced back to exactly the context it saw.
//!
//! The ledger is dependency-injected. There is no global engine instance;
//! callers own theirs and pass session ids explicitly.

mod assembler;

pub use assembler::AssembledContext;

use memwell_core::{
    ContextEntry, ContextLedger, Error, LedgerError, LineageRecord, NewLineage, NewSummary,
    Result, SessionMode, Summary, TrimReport,
};
use memwell_store::{StoreLimits, WorkingContextStore};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// How the engine reacts when the durable ledger fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DegradedMode {
    /// Ledger errors propagate to the caller.
    #[default]
    Strict,
    /// Ledger errors are logged and the engine continues in-memory only.
    ContinueInMemory,
}

pub struct ContextEngine {
    working: WorkingContextStore,
    ledger: Option<Arc<dyn ContextLedger>>,
    mode: DegradedMode,
}

impl ContextEngine {
    /// An engine with no durable tier. Assembly never degrades because there
    /// is nothing to fail; lineage and summaries are unavailable.
    pub fn in_memory(limits: StoreLimits) -> Self {
        Self {
            working: WorkingContextStore::new(limits),
            ledger: None,
            mode: DegradedMode::Strict,
        }
    }

    pub fn with_ledger(
        limits: StoreLimits,
        ledger: Arc<dyn ContextLedger>,
        mode: DegradedMode,
    ) -> Self {
        Self {
            working: WorkingContextStore::new(limits),
            ledger: Some(ledger),
            mode,
        }
    }

    pub fn working(&self) -> &WorkingContextStore {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut WorkingContextStore {
        &mut self.working
    }

    fn ledger(&self) -> Result<&Arc<dyn ContextLedger>> {
        self.ledger.as_ref().ok_or_else(|| {
            Error::Ledger(LedgerError::StorageUnavailable(
                "no durable ledger configured".into(),
            ))
        })
    }

    /// Whether a ledger error should be absorbed rather than propagated.
    fn absorb(&self, err: &LedgerError, during: &str) -> bool {
        match self.mode {
            DegradedMode::Strict => false,
            DegradedMode::ContinueInMemory => {
                warn!(error = %err, during, "ledger unavailable, continuing in-memory only");
                true
            }
        }
    }

    /// Ingest an entry: working store first, then mirrored to the ledger.
    /// An empty id is replaced with a generated one so both tiers agree on
    /// it. Returns the assigned id.
    pub async fn push(&mut self, session_id: &str, mut entry: ContextEntry) -> Result<String> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();

        if let Some(evicted) = self.working.add_context(entry.clone())? {
            debug!(evicted_id = %evicted.id, "working store evicted lowest-priority entry");
        }

        if let Some(ledger) = &self.ledger {
            if let Err(err) = ledger.add_entry(session_id, entry).await {
                if !self.absorb(&err, "push") {
                    return Err(err.into());
                }
            }
        }
        Ok(id)
    }

    /// Build the context set for a model request: working-tier ranking first,
    /// then durable entries not already present, cut off at `token_budget`,
    /// with summary tiers appended for the history beyond the entries.
    pub async fn assemble(
        &self,
        session_id: &str,
        limit: usize,
        token_budget: u64,
    ) -> Result<AssembledContext> {
        let working: Vec<ContextEntry> = self
            .working
            .get_sorted_contexts()
            .into_iter()
            .cloned()
            .collect();

        let mut degraded = false;
        let from_ledger = match &self.ledger {
            None => Vec::new(),
            Some(ledger) => match ledger.get_relevant_context(session_id, limit).await {
                Ok(entries) => entries,
                Err(err) if self.absorb(&err, "assemble") => {
                    degraded = true;
                    Vec::new()
                }
                Err(err) => return Err(err.into()),
            },
        };

        let mut assembled = assembler::merge_ranked(working, from_ledger, limit, token_budget);
        assembled.degraded = degraded;

        if let Some(ledger) = &self.ledger {
            if !degraded {
                match ledger.get_summaries(session_id).await {
                    Ok(summaries) => assembled.summaries = summaries,
                    Err(err) if self.absorb(&err, "assemble summaries") => {
                        assembled.degraded = true;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        debug!(
            session_id,
            entries = assembled.entries.len(),
            summaries = assembled.summaries.len(),
            total_tokens = assembled.total_tokens,
            degraded = assembled.degraded,
            "assembled context"
        );
        Ok(assembled)
    }

    /// Record which context a response was generated from, in assembled
    /// order. Requires a ledger; degraded mode does not apply to lineage
    /// because an unrecorded lineage row cannot be reconstructed later.
    pub async fn record_response(
        &self,
        session_id: &str,
        response_id: &str,
        assembled: &AssembledContext,
        model: &str,
        mode: SessionMode,
    ) -> Result<LineageRecord> {
        let ledger = self.ledger()?;
        let record = ledger
            .record_lineage(
                session_id,
                NewLineage {
                    response_id: response_id.to_string(),
                    context_entry_ids: assembled.entry_ids(),
                    summary_ids: assembled.summary_ids(),
                    model: model.to_string(),
                    mode,
                },
            )
            .await?;
        Ok(record)
    }

    /// Safe maintenance order: persist the summary covering the history
    /// about to be dropped, then trim down to the token target. Running trim
    /// first would lose entries no summary accounts for.
    pub async fn summarize_then_trim(
        &self,
        session_id: &str,
        summary: NewSummary,
        target_tokens: u64,
    ) -> Result<(Summary, TrimReport)> {
        let ledger = self.ledger()?;
        let summary = ledger.create_summary(session_id, summary).await?;
        let report = ledger.trim_context(session_id, target_tokens).await?;
        Ok((summary, report))
    }
}
