//! Summary tier types.
//!
//! Summaries are layered, ordered condensations of older entries. Layer 0 is
//! the finest; higher layers condense lower ones. Summary text is produced by
//! an external model call — this subsystem only validates and stores it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provenance tag for how a summary was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMethod {
    /// Generated by a model call (default).
    #[default]
    ModelGenerated,
    /// Mechanical truncation of raw entries.
    Truncation,
    /// Hand-written by the user.
    Manual,
}

impl SummaryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelGenerated => "model_generated",
            Self::Truncation => "truncation",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SummaryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_generated" => Ok(Self::ModelGenerated),
            "truncation" => Ok(Self::Truncation),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown summary method: {other}")),
        }
    }
}

/// An immutable, layered condensation of older context.
///
/// Per (session, layer), `covers_until` values form a non-decreasing
/// sequence; the ledger enforces this on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub session_id: String,
    /// Tier index; 0 is the finest layer.
    pub layer: u32,
    pub content: String,
    /// Boundary up to which raw entries are represented by this summary.
    pub covers_until: DateTime<Utc>,
    pub method: SummaryMethod,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_str() {
        for method in [
            SummaryMethod::ModelGenerated,
            SummaryMethod::Truncation,
            SummaryMethod::Manual,
        ] {
            assert_eq!(method.as_str().parse::<SummaryMethod>().unwrap(), method);
        }
        assert!("telepathy".parse::<SummaryMethod>().is_err());
    }

    #[test]
    fn summary_serialization() {
        let summary = Summary {
            id: "s1".into(),
            session_id: "sess".into(),
            layer: 0,
            content: "Discussed trimming strategy".into(),
            covers_until: Utc::now(),
            method: SummaryMethod::ModelGenerated,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("model_generated"));
        assert!(json.contains("trimming strategy"));
    }
}
