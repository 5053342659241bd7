//! Summary tier storage.
//!
//! Summaries are append-only condensations of older entries, layered by
//! coarseness. The one invariant enforced here: per (session, layer), the
//! `covers_until` boundaries form a non-decreasing sequence. Equal
//! boundaries are allowed — a layer-0 refresh covering the same window is
//! legitimate. Boundary comparison happens in Rust on parsed timestamps.

use crate::sqlite::SqliteLedger;
use chrono::Utc;
use memwell_core::{LedgerError, NewSummary, Summary, SummaryMethod};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

impl SqliteLedger {
    pub(crate) async fn insert_summary(
        &self,
        session_id: &str,
        summary: NewSummary,
    ) -> Result<Summary, LedgerError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        self.ensure_session_touched(session_id).await?;

        let rows = sqlx::query(
            "SELECT covers_until FROM summaries WHERE session_id = ?1 AND layer = ?2",
        )
        .bind(session_id)
        .bind(summary.layer as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| LedgerError::QueryFailed(format!("summary boundaries: {e}")))?;

        let mut latest = None;
        for row in &rows {
            let value: String = row
                .try_get("covers_until")
                .map_err(|e| LedgerError::QueryFailed(format!("covers_until column: {e}")))?;
            let boundary = Self::parse_ts(&value, "covers_until")?;
            if latest.map_or(true, |l| boundary > l) {
                latest = Some(boundary);
            }
        }

        if let Some(latest) = latest {
            if summary.covers_until < latest {
                return Err(LedgerError::OutOfOrderSummary {
                    layer: summary.layer,
                    covers_until: summary.covers_until.to_rfc3339(),
                    latest: latest.to_rfc3339(),
                });
            }
        }

        let stored = Summary {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            layer: summary.layer,
            content: summary.content,
            covers_until: summary.covers_until,
            method: summary.method,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO summaries (id, session_id, layer, content, covers_until, method, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.session_id)
        .bind(stored.layer as i64)
        .bind(&stored.content)
        .bind(stored.covers_until.to_rfc3339())
        .bind(stored.method.as_str())
        .bind(stored.created_at.to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|e| LedgerError::QueryFailed(format!("summary insert: {e}")))?;

        debug!(session_id, layer = stored.layer, summary_id = %stored.id, "stored summary");
        Ok(stored)
    }

    /// All summaries for a session: layer ascending, then recency
    /// descending — the shape assembly wants for "older than X" history.
    pub(crate) async fn fetch_summaries(
        &self,
        session_id: &str,
    ) -> Result<Vec<Summary>, LedgerError> {
        let rows = sqlx::query("SELECT * FROM summaries WHERE session_id = ?1")
            .bind(session_id)
            .fetch_all(self.pool())
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("summaries by session: {e}")))?;

        let mut summaries = rows
            .iter()
            .map(Self::row_to_summary)
            .collect::<Result<Vec<_>, _>>()?;
        summaries.sort_by(|a, b| {
            a.layer
                .cmp(&b.layer)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<Summary, LedgerError> {
        let layer: i64 = row
            .try_get("layer")
            .map_err(|e| LedgerError::QueryFailed(format!("layer column: {e}")))?;
        let method_str: String = row
            .try_get("method")
            .map_err(|e| LedgerError::QueryFailed(format!("method column: {e}")))?;
        let method = method_str
            .parse::<SummaryMethod>()
            .map_err(LedgerError::QueryFailed)?;
        let covers_until_str: String = row
            .try_get("covers_until")
            .map_err(|e| LedgerError::QueryFailed(format!("covers_until column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Summary {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::QueryFailed(format!("id column: {e}")))?,
            session_id: row
                .try_get("session_id")
                .map_err(|e| LedgerError::QueryFailed(format!("session_id column: {e}")))?,
            layer: layer.max(0) as u32,
            content: row
                .try_get("content")
                .map_err(|e| LedgerError::QueryFailed(format!("content column: {e}")))?,
            covers_until: Self::parse_ts(&covers_until_str, "covers_until")?,
            method,
            created_at: Self::parse_ts(&created_at_str, "created_at")?,
        })
    }
}
