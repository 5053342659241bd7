//! Retention scoring.
//!
//! A pure, deterministic policy combining caller-assigned importance with a
//! linear recency decay. Used by the ledger both for ranking
//! (`get_relevant_context`) and for choosing eviction victims
//! (`trim_context`), so the two always agree on which entries matter least.

use chrono::Duration;

/// Weighted importance/recency scoring policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    /// Weight applied to caller-assigned importance.
    pub importance_weight: f64,
    /// Weight applied to the recency score.
    pub recency_weight: f64,
    /// Horizon at which recency decays to zero.
    pub max_age: Duration,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            importance_weight: 0.6,
            recency_weight: 0.4,
            max_age: Duration::days(7),
        }
    }
}

impl ScoringPolicy {
    pub fn new(importance_weight: f64, recency_weight: f64, max_age: Duration) -> Self {
        Self {
            importance_weight,
            recency_weight,
            max_age,
        }
    }

    /// Normalized decay of entry age against the horizon: 1.0 for brand-new
    /// entries, 0.0 at or past `max_age`. Negative ages (clock skew) count
    /// as brand-new.
    pub fn recency_score(&self, age: Duration) -> f64 {
        let age_ms = age.num_milliseconds().max(0) as f64;
        let max_ms = self.max_age.num_milliseconds().max(1) as f64;
        1.0 - (age_ms / max_ms).min(1.0)
    }

    /// `importance × w_i + recency × w_r`, with importance clamped to [0, 1].
    pub fn hybrid_score(&self, importance: f64, age: Duration) -> f64 {
        let importance = importance.clamp(0.0, 1.0);
        importance * self.importance_weight + self.recency_score(age) * self.recency_weight
    }
}
