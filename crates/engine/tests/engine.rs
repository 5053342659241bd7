//! End-to-end engine tests against a real SQLite ledger.

use async_trait::async_trait;
use memwell_core::{
    ContextEntry, ContextKind, ContextLedger, LedgerError, LineageRecord, NewLineage, NewSummary,
    Session, SessionMode, Summary, TrimReport,
};
use memwell_engine::{ContextEngine, DegradedMode};
use memwell_ledger::SqliteLedger;
use memwell_store::StoreLimits;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn entry(id: &str, importance: f64, tokens: u64) -> ContextEntry {
    ContextEntry::new(id, ContextKind::Conversation, format!("content {id}"))
        .with_importance(importance)
        .with_token_estimate(tokens)
}

#[tokio::test]
async fn ingest_summarize_trim_assemble_lineage() {
    init_tracing();
    let ledger = Arc::new(SqliteLedger::open_in_memory().await.unwrap());
    let mut engine = ContextEngine::with_ledger(
        StoreLimits::default(),
        ledger.clone() as Arc<dyn ContextLedger>,
        DegradedMode::Strict,
    );

    engine.push("s", entry("vital", 0.9, 40)).await.unwrap();
    engine.push("s", entry("useful", 0.5, 40)).await.unwrap();
    engine.push("s", entry("noise", 0.1, 40)).await.unwrap();
    assert_eq!(ledger.total_tokens("s").await.unwrap(), 120);

    // Summarize the history about to be dropped, then trim to 80 tokens.
    let (summary, report) = engine
        .summarize_then_trim(
            "s",
            NewSummary {
                layer: 0,
                content: "early conversation, mostly noise".into(),
                covers_until: chrono::Utc::now(),
                method: Default::default(),
            },
            80,
        )
        .await
        .unwrap();
    assert_eq!(report.entries_removed, 1);
    assert_eq!(report.tokens_remaining, 80);
    assert!(ledger.get_entry("noise").await.unwrap().is_none());

    // Clear the working tier so assembly exercises the durable ranking.
    engine.working_mut().clear();
    let assembled = engine.assemble("s", 10, 1_000).await.unwrap();
    let ids: Vec<&str> = assembled.entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["vital", "useful"]);
    assert_eq!(assembled.summaries.len(), 1);
    assert_eq!(assembled.summaries[0].id, summary.id);
    assert!(!assembled.degraded);

    let record = engine
        .record_response("s", "resp-1", &assembled, "gpt-test", SessionMode::Chat)
        .await
        .unwrap();
    assert_eq!(record.context_entry_ids, vec!["vital", "useful"]);
    assert_eq!(record.summary_ids, vec![summary.id.clone()]);

    let fetched = ledger.get_lineage("resp-1").await.unwrap().unwrap();
    assert_eq!(fetched, record);
}

#[tokio::test]
async fn working_tier_outranks_ledger_and_dedup_holds() {
    let ledger = Arc::new(SqliteLedger::open_in_memory().await.unwrap());
    let mut engine = ContextEngine::with_ledger(
        StoreLimits::default(),
        ledger.clone() as Arc<dyn ContextLedger>,
        DegradedMode::Strict,
    );

    // Mirrored into both tiers; must appear exactly once.
    engine.push("s", entry("shared", 0.8, 10)).await.unwrap();
    // Ledger-only entry, as after a process restart.
    ledger.add_entry("s", entry("durable", 0.9, 10)).await.unwrap();

    let assembled = engine.assemble("s", 10, 1_000).await.unwrap();
    let ids: Vec<&str> = assembled.entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["shared", "durable"]);
    assert_eq!(assembled.from_working, 1);
    assert_eq!(assembled.from_ledger, 1);
}

/// A ledger whose every operation fails, for degraded-mode coverage.
struct BrokenLedger;

#[async_trait]
impl ContextLedger for BrokenLedger {
    fn name(&self) -> &str {
        "broken"
    }

    async fn init(&self) -> Result<(), LedgerError> {
        Err(down())
    }

    async fn create_session(
        &self,
        _mode: SessionMode,
        _active_model: &str,
    ) -> Result<Session, LedgerError> {
        Err(down())
    }

    async fn get_session(&self, _session_id: &str) -> Result<Option<Session>, LedgerError> {
        Err(down())
    }

    async fn get_or_create_current_session(
        &self,
        _mode: SessionMode,
        _active_model: &str,
    ) -> Result<Session, LedgerError> {
        Err(down())
    }

    async fn add_entry(
        &self,
        _session_id: &str,
        _entry: ContextEntry,
    ) -> Result<String, LedgerError> {
        Err(down())
    }

    async fn get_entry(&self, _id: &str) -> Result<Option<ContextEntry>, LedgerError> {
        Err(down())
    }

    async fn delete_entry(&self, _id: &str) -> Result<bool, LedgerError> {
        Err(down())
    }

    async fn count_entries(&self, _session_id: &str) -> Result<usize, LedgerError> {
        Err(down())
    }

    async fn total_tokens(&self, _session_id: &str) -> Result<u64, LedgerError> {
        Err(down())
    }

    async fn get_relevant_context(
        &self,
        _session_id: &str,
        _limit: usize,
    ) -> Result<Vec<ContextEntry>, LedgerError> {
        Err(down())
    }

    async fn trim_context(
        &self,
        _session_id: &str,
        _target_tokens: u64,
    ) -> Result<TrimReport, LedgerError> {
        Err(down())
    }

    async fn create_summary(
        &self,
        _session_id: &str,
        _summary: NewSummary,
    ) -> Result<Summary, LedgerError> {
        Err(down())
    }

    async fn get_summaries(&self, _session_id: &str) -> Result<Vec<Summary>, LedgerError> {
        Err(down())
    }

    async fn record_lineage(
        &self,
        _session_id: &str,
        _lineage: NewLineage,
    ) -> Result<LineageRecord, LedgerError> {
        Err(down())
    }

    async fn get_lineage(&self, _response_id: &str) -> Result<Option<LineageRecord>, LedgerError> {
        Err(down())
    }
}

fn down() -> LedgerError {
    LedgerError::StorageUnavailable("disk on fire".into())
}

#[tokio::test]
async fn strict_mode_propagates_ledger_failures() {
    let mut engine = ContextEngine::with_ledger(
        StoreLimits::default(),
        Arc::new(BrokenLedger),
        DegradedMode::Strict,
    );
    assert!(engine.push("s", entry("e", 0.5, 10)).await.is_err());
    assert!(engine.assemble("s", 10, 1_000).await.is_err());
}

#[tokio::test]
async fn degraded_mode_continues_on_working_tier() {
    init_tracing();
    let mut engine = ContextEngine::with_ledger(
        StoreLimits::default(),
        Arc::new(BrokenLedger),
        DegradedMode::ContinueInMemory,
    );

    engine.push("s", entry("kept", 0.5, 10)).await.unwrap();

    let assembled = engine.assemble("s", 10, 1_000).await.unwrap();
    assert!(assembled.degraded);
    assert_eq!(assembled.entries.len(), 1);
    assert_eq!(assembled.entries[0].id, "kept");
    assert!(assembled.summaries.is_empty());

    // Lineage has no in-memory fallback even in degraded mode.
    assert!(engine
        .record_response("s", "resp", &assembled, "m", SessionMode::Chat)
        .await
        .is_err());
}
