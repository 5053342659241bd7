//! SQLite ledger backend.
//!
//! Uses a single database file with four tables:
//! - `sessions` — durable interaction sessions
//! - `entries` — context entries, scored for relevance and trimming
//! - `summaries` — layered condensations (see `tiers`)
//! - `lineage` — append-only response provenance (see `lineage`)
//!
//! Timestamps are stored as RFC 3339 text and parsed back before any
//! ordering-sensitive comparison; SQL never compares them lexicographically.

use chrono::{DateTime, Utc};
use memwell_core::{
    ContextEntry, ContextLedger, EntryMetadata, LedgerError, LineageRecord, NewLineage,
    NewSummary, ScoringPolicy, Session, SessionMode, Summary, TrimReport,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Model name recorded for sessions created lazily by a write, before any
/// explicit `create_session` call named one.
const LAZY_SESSION_MODEL: &str = "unknown";

/// A durable context ledger on SQLite.
///
/// Exactly one instance should own the write handle for a given database
/// file at a time.
#[derive(Debug)]
pub struct SqliteLedger {
    pool: SqlitePool,
    policy: ScoringPolicy,
    // Serializes writes per session id. Reads go straight to the pool; WAL
    // gives them a consistent snapshot against an in-flight trim.
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SqliteLedger {
    /// Open (or create) a ledger database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn open(path: &str, policy: ScoringPolicy) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| LedgerError::StorageUnavailable(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Each connection to `:memory:` is its own database, so the
        // ephemeral case must stay on a single long-lived connection.
        let in_memory = path.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::StorageUnavailable(format!("failed to open SQLite: {e}")))?;

        let ledger = Self {
            pool,
            policy,
            session_locks: Mutex::new(HashMap::new()),
        };
        ledger.run_migrations().await?;
        info!("SQLite context ledger initialized at {path}");
        Ok(ledger)
    }

    /// Open an in-process ephemeral ledger with the default scoring policy.
    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        Self::open("sqlite::memory:", ScoringPolicy::default()).await
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema setup. Every statement is `IF NOT EXISTS`, so re-running is
    /// harmless.
    async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id             TEXT PRIMARY KEY,
                mode           TEXT NOT NULL,
                active_model   TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                last_active_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT UNIQUE NOT NULL,
                session_id     TEXT NOT NULL REFERENCES sessions(id),
                kind           TEXT NOT NULL,
                content        TEXT NOT NULL,
                metadata       TEXT NOT NULL,
                priority       INTEGER NOT NULL DEFAULT 0,
                importance     REAL NOT NULL DEFAULT 0.0,
                token_estimate INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("entries table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_session ON entries(session_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("entries index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                id           TEXT PRIMARY KEY,
                session_id   TEXT NOT NULL REFERENCES sessions(id),
                layer        INTEGER NOT NULL,
                content      TEXT NOT NULL,
                covers_until TEXT NOT NULL,
                method       TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("summaries table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_summaries_session_layer ON summaries(session_id, layer)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("summaries index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lineage (
                iid               INTEGER PRIMARY KEY AUTOINCREMENT,
                id                TEXT UNIQUE NOT NULL,
                response_id       TEXT NOT NULL,
                session_id        TEXT NOT NULL REFERENCES sessions(id),
                context_entry_ids TEXT NOT NULL,
                summary_ids       TEXT NOT NULL,
                model             TEXT NOT NULL,
                mode              TEXT NOT NULL,
                created_at        TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("lineage table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lineage_response ON lineage(response_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::MigrationFailed(format!("lineage index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    // --- Shared helpers ---

    pub(crate) async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn parse_ts(value: &str, column: &str) -> Result<DateTime<Utc>, LedgerError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LedgerError::QueryFailed(format!("{column} timestamp: {e}")))
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, LedgerError> {
        let mode_str: String = row
            .try_get("mode")
            .map_err(|e| LedgerError::QueryFailed(format!("mode column: {e}")))?;
        let mode = mode_str
            .parse::<SessionMode>()
            .map_err(LedgerError::QueryFailed)?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::QueryFailed(format!("created_at column: {e}")))?;
        let last_active_str: String = row
            .try_get("last_active_at")
            .map_err(|e| LedgerError::QueryFailed(format!("last_active_at column: {e}")))?;

        Ok(Session {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::QueryFailed(format!("id column: {e}")))?,
            mode,
            active_model: row
                .try_get("active_model")
                .map_err(|e| LedgerError::QueryFailed(format!("active_model column: {e}")))?,
            created_at: Self::parse_ts(&created_at_str, "created_at")?,
            last_active_at: Self::parse_ts(&last_active_str, "last_active_at")?,
        })
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ContextEntry, LedgerError> {
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| LedgerError::QueryFailed(format!("metadata column: {e}")))?;
        let metadata: EntryMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| LedgerError::QueryFailed(format!("metadata json: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::QueryFailed(format!("created_at column: {e}")))?;
        let token_estimate: i64 = row
            .try_get("token_estimate")
            .map_err(|e| LedgerError::QueryFailed(format!("token_estimate column: {e}")))?;

        Ok(ContextEntry {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::QueryFailed(format!("id column: {e}")))?,
            content: row
                .try_get("content")
                .map_err(|e| LedgerError::QueryFailed(format!("content column: {e}")))?,
            metadata,
            priority: row
                .try_get("priority")
                .map_err(|e| LedgerError::QueryFailed(format!("priority column: {e}")))?,
            importance: row
                .try_get("importance")
                .map_err(|e| LedgerError::QueryFailed(format!("importance column: {e}")))?,
            token_estimate: token_estimate.max(0) as u64,
            created_at: Self::parse_ts(&created_at_str, "created_at")?,
        })
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Option<Session>, LedgerError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("session by id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn insert_session(&self, session: &Session) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, mode, active_model, created_at, last_active_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&session.id)
        .bind(session.mode.as_str())
        .bind(&session.active_model)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_active_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::QueryFailed(format!("session insert: {e}")))?;
        Ok(())
    }

    /// Create the session row lazily if absent, and bump `last_active_at`
    /// (never backwards). Callers hold the session write lock.
    pub(crate) async fn ensure_session_touched(
        &self,
        session_id: &str,
    ) -> Result<(), LedgerError> {
        match self.fetch_session(session_id).await? {
            Some(mut session) => {
                session.touch(Utc::now());
                sqlx::query("UPDATE sessions SET last_active_at = ?1 WHERE id = ?2")
                    .bind(session.last_active_at.to_rfc3339())
                    .bind(session_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| LedgerError::QueryFailed(format!("session touch: {e}")))?;
            }
            None => {
                let now = Utc::now();
                let session = Session {
                    id: session_id.to_string(),
                    mode: SessionMode::default(),
                    active_model: LAZY_SESSION_MODEL.to_string(),
                    created_at: now,
                    last_active_at: now,
                };
                self.insert_session(&session).await?;
                debug!(session_id, "created session lazily on first write");
            }
        }
        Ok(())
    }

    async fn fetch_session_entries(
        &self,
        session_id: &str,
    ) -> Result<Vec<ContextEntry>, LedgerError> {
        let rows = sqlx::query("SELECT * FROM entries WHERE session_id = ?1 ORDER BY iid")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("entries by session: {e}")))?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Rank entries by hybrid score at a single `now` snapshot.
    /// Deterministic: score desc, then `created_at` desc, then id.
    fn rank_by_score(
        &self,
        mut entries: Vec<ContextEntry>,
        now: DateTime<Utc>,
    ) -> Vec<(f64, ContextEntry)> {
        let mut scored: Vec<(f64, ContextEntry)> = entries
            .drain(..)
            .map(|e| {
                let score = self.policy.hybrid_score(e.importance, now - e.created_at);
                (score, e)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored
    }
}

#[async_trait::async_trait]
impl ContextLedger for SqliteLedger {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn init(&self) -> Result<(), LedgerError> {
        self.run_migrations().await
    }

    async fn create_session(
        &self,
        mode: SessionMode,
        active_model: &str,
    ) -> Result<Session, LedgerError> {
        let session = Session::new(mode, active_model);
        self.insert_session(&session).await?;
        info!(session_id = %session.id, %mode, "created session");
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, LedgerError> {
        self.fetch_session(session_id).await
    }

    async fn get_or_create_current_session(
        &self,
        mode: SessionMode,
        active_model: &str,
    ) -> Result<Session, LedgerError> {
        let rows = sqlx::query("SELECT * FROM sessions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("sessions scan: {e}")))?;

        let mut sessions = rows
            .iter()
            .map(Self::row_to_session)
            .collect::<Result<Vec<_>, _>>()?;
        sessions.sort_by(|a, b| {
            b.last_active_at
                .cmp(&a.last_active_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        match sessions.into_iter().next() {
            Some(current) => Ok(current),
            None => self.create_session(mode, active_model).await,
        }
    }

    async fn add_entry(
        &self,
        session_id: &str,
        mut entry: ContextEntry,
    ) -> Result<String, LedgerError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        self.ensure_session_touched(session_id).await?;

        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        entry.importance = entry.importance.clamp(0.0, 1.0);
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|e| LedgerError::QueryFailed(format!("metadata serialization: {e}")))?;

        // Re-adding an existing id is the mirror of a working-tier update:
        // content and scoring fields are replaced, id and created_at kept.
        sqlx::query(
            r#"
            INSERT INTO entries
                (id, session_id, kind, content, metadata, priority, importance, token_estimate, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                metadata = excluded.metadata,
                kind = excluded.kind,
                priority = excluded.priority,
                importance = excluded.importance,
                token_estimate = excluded.token_estimate
            "#,
        )
        .bind(&entry.id)
        .bind(session_id)
        .bind(entry.kind().as_str())
        .bind(&entry.content)
        .bind(&metadata_json)
        .bind(entry.priority)
        .bind(entry.importance)
        .bind(entry.token_estimate as i64)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::QueryFailed(format!("entry insert: {e}")))?;

        debug!(session_id, entry_id = %entry.id, "persisted entry");
        Ok(entry.id)
    }

    async fn get_entry(&self, id: &str) -> Result<Option<ContextEntry>, LedgerError> {
        let row = sqlx::query("SELECT * FROM entries WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("entry by id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_entry(r)?)),
            None => Ok(None),
        }
    }

    async fn delete_entry(&self, id: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM entries WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("entry delete: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_entries(&self, session_id: &str) -> Result<usize, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM entries WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("entry count: {e}")))?;
        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| LedgerError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    async fn total_tokens(&self, session_id: &str) -> Result<u64, LedgerError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(token_estimate), 0) AS total FROM entries WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::QueryFailed(format!("token total: {e}")))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| LedgerError::QueryFailed(format!("total column: {e}")))?;
        Ok(total.max(0) as u64)
    }

    async fn get_relevant_context(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ContextEntry>, LedgerError> {
        let entries = self.fetch_session_entries(session_id).await?;
        let mut ranked = self.rank_by_score(entries, Utc::now());
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(_, e)| e).collect())
    }

    async fn trim_context(
        &self,
        session_id: &str,
        target_tokens: u64,
    ) -> Result<TrimReport, LedgerError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let entries = self.fetch_session_entries(session_id).await?;
        let total: u64 = entries.iter().map(|e| e.token_estimate).sum();
        if total <= target_tokens {
            return Ok(TrimReport {
                entries_removed: 0,
                tokens_removed: 0,
                tokens_remaining: total,
            });
        }

        // Lowest-scoring first; among equals the oldest goes, then by id.
        let mut victims = self.rank_by_score(entries, Utc::now());
        victims.reverse();

        let mut removed_ids: Vec<String> = Vec::new();
        let mut removed_tokens: u64 = 0;
        for (_, entry) in victims {
            if total - removed_tokens <= target_tokens {
                break;
            }
            removed_tokens += entry.token_estimate;
            removed_ids.push(entry.id);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("trim begin: {e}")))?;
        for id in &removed_ids {
            sqlx::query("DELETE FROM entries WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| LedgerError::QueryFailed(format!("trim delete: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("trim commit: {e}")))?;

        let report = TrimReport {
            entries_removed: removed_ids.len(),
            tokens_removed: removed_tokens,
            tokens_remaining: total - removed_tokens,
        };
        info!(
            session_id,
            entries_removed = report.entries_removed,
            tokens_removed = report.tokens_removed,
            tokens_remaining = report.tokens_remaining,
            "trimmed context to token budget"
        );
        Ok(report)
    }

    async fn create_summary(
        &self,
        session_id: &str,
        summary: NewSummary,
    ) -> Result<Summary, LedgerError> {
        self.insert_summary(session_id, summary).await
    }

    async fn get_summaries(&self, session_id: &str) -> Result<Vec<Summary>, LedgerError> {
        self.fetch_summaries(session_id).await
    }

    async fn record_lineage(
        &self,
        session_id: &str,
        lineage: NewLineage,
    ) -> Result<LineageRecord, LedgerError> {
        self.insert_lineage(session_id, lineage).await
    }

    async fn get_lineage(&self, response_id: &str) -> Result<Option<LineageRecord>, LedgerError> {
        self.fetch_lineage(response_id).await
    }
}
