//! Lineage (provenance) types.
//!
//! A lineage record answers "what did the assistant see when producing
//! response R". Records are append-only: re-recording the same response id
//! keeps the older rows for audit, and lookup returns the latest.

use crate::session::SessionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of the context that fed one generated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub id: String,
    pub response_id: String,
    pub session_id: String,
    /// Entry ids in the order they were supplied to the model.
    pub context_entry_ids: Vec<String>,
    /// Summary ids in the order they were supplied to the model.
    pub summary_ids: Vec<String>,
    pub model: String,
    pub mode: SessionMode,
    pub created_at: DateTime<Utc>,
}
