//! Lineage storage.
//!
//! Append-only: re-recording a response id inserts a fresh row and keeps the
//! older ones for audit. Lookup returns the latest row by `created_at`, with
//! the rowid as the tiebreak for records written within the same instant.

use crate::sqlite::SqliteLedger;
use chrono::Utc;
use memwell_core::{LedgerError, LineageRecord, NewLineage, SessionMode};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

impl SqliteLedger {
    pub(crate) async fn insert_lineage(
        &self,
        session_id: &str,
        lineage: NewLineage,
    ) -> Result<LineageRecord, LedgerError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        self.ensure_session_touched(session_id).await?;

        let record = LineageRecord {
            id: Uuid::new_v4().to_string(),
            response_id: lineage.response_id,
            session_id: session_id.to_string(),
            context_entry_ids: lineage.context_entry_ids,
            summary_ids: lineage.summary_ids,
            model: lineage.model,
            mode: lineage.mode,
            created_at: Utc::now(),
        };

        let entry_ids_json = serde_json::to_string(&record.context_entry_ids)
            .map_err(|e| LedgerError::QueryFailed(format!("entry ids serialization: {e}")))?;
        let summary_ids_json = serde_json::to_string(&record.summary_ids)
            .map_err(|e| LedgerError::QueryFailed(format!("summary ids serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO lineage
                (id, response_id, session_id, context_entry_ids, summary_ids, model, mode, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.response_id)
        .bind(&record.session_id)
        .bind(&entry_ids_json)
        .bind(&summary_ids_json)
        .bind(&record.model)
        .bind(record.mode.as_str())
        .bind(record.created_at.to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|e| LedgerError::QueryFailed(format!("lineage insert: {e}")))?;

        debug!(session_id, response_id = %record.response_id, "recorded lineage");
        Ok(record)
    }

    pub(crate) async fn fetch_lineage(
        &self,
        response_id: &str,
    ) -> Result<Option<LineageRecord>, LedgerError> {
        let rows = sqlx::query("SELECT * FROM lineage WHERE response_id = ?1 ORDER BY iid")
            .bind(response_id)
            .fetch_all(self.pool())
            .await
            .map_err(|e| LedgerError::QueryFailed(format!("lineage by response: {e}")))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::row_to_lineage(row)?);
        }
        // Rows come back in insert order; the last one with the greatest
        // created_at is the authoritative record.
        Ok(records
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    fn row_to_lineage(row: &sqlx::sqlite::SqliteRow) -> Result<LineageRecord, LedgerError> {
        let entry_ids_json: String = row
            .try_get("context_entry_ids")
            .map_err(|e| LedgerError::QueryFailed(format!("context_entry_ids column: {e}")))?;
        let summary_ids_json: String = row
            .try_get("summary_ids")
            .map_err(|e| LedgerError::QueryFailed(format!("summary_ids column: {e}")))?;
        let mode_str: String = row
            .try_get("mode")
            .map_err(|e| LedgerError::QueryFailed(format!("mode column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(LineageRecord {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::QueryFailed(format!("id column: {e}")))?,
            response_id: row
                .try_get("response_id")
                .map_err(|e| LedgerError::QueryFailed(format!("response_id column: {e}")))?,
            session_id: row
                .try_get("session_id")
                .map_err(|e| LedgerError::QueryFailed(format!("session_id column: {e}")))?,
            context_entry_ids: serde_json::from_str(&entry_ids_json)
                .map_err(|e| LedgerError::QueryFailed(format!("entry ids json: {e}")))?,
            summary_ids: serde_json::from_str(&summary_ids_json)
                .map_err(|e| LedgerError::QueryFailed(format!("summary ids json: {e}")))?,
            model: row
                .try_get("model")
                .map_err(|e| LedgerError::QueryFailed(format!("model column: {e}")))?,
            mode: mode_str
                .parse::<SessionMode>()
                .map_err(LedgerError::QueryFailed)?,
            created_at: Self::parse_ts(&created_at_str, "created_at")?,
        })
    }
}
