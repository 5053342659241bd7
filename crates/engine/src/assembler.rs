//! Deterministic merge of the two context tiers.
//!
//! The working tier ranks by priority, the durable tier by hybrid score.
//! Assembly takes the working ranking first, appends ledger entries not
//! already present, and cuts off at the first entry that does not fit the
//! token budget. Stopping at the first misfit (rather than skipping it and
//! packing smaller entries) keeps the assembled set a strict rank prefix,
//! so the same inputs always produce the same context.

use memwell_core::{ContextEntry, Summary};

/// The context handed to a model request, plus accounting for lineage.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Entries in final rank order.
    pub entries: Vec<ContextEntry>,
    /// Summary tiers covering history older than the entries.
    pub summaries: Vec<Summary>,
    /// Sum of token estimates across `entries`.
    pub total_tokens: u64,
    /// How many entries came from the working tier.
    pub from_working: usize,
    /// How many came from the durable ledger.
    pub from_ledger: usize,
    /// True when a ledger failure was absorbed and this set is in-memory only.
    pub degraded: bool,
}

impl AssembledContext {
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn summary_ids(&self) -> Vec<String> {
        self.summaries.iter().map(|s| s.id.clone()).collect()
    }
}

/// Merge pre-ranked tiers under an entry limit and a token budget.
pub(crate) fn merge_ranked(
    working: Vec<ContextEntry>,
    ledger: Vec<ContextEntry>,
    limit: usize,
    token_budget: u64,
) -> AssembledContext {
    let mut out = AssembledContext::default();

    let from_working = working.len();
    let candidates = working
        .into_iter()
        .map(|e| (true, e))
        .chain(ledger.into_iter().map(|e| (false, e)));

    for (is_working, entry) in candidates {
        if out.entries.len() >= limit {
            break;
        }
        // The ledger mirrors working-tier entries; keep the first occurrence.
        if !is_working && out.entries.iter().any(|e| e.id == entry.id) {
            continue;
        }
        if out.total_tokens + entry.token_estimate > token_budget {
            break;
        }
        out.total_tokens += entry.token_estimate;
        if is_working {
            out.from_working += 1;
        } else {
            out.from_ledger += 1;
        }
        out.entries.push(entry);
    }

    debug_assert!(out.from_working <= from_working);
    out
}
