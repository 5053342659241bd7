//! Search capability seam.
//!
//! The working store's query matching is deliberately simple (case-sensitive
//! substring scan). Callers depend on this trait rather than the store
//! directly, so an indexed full-text implementation can replace the scan
//! later without touching call sites.

use memwell_core::ContextEntry;

/// Options for a context search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Also match against the serialized entry metadata.
    pub search_metadata: bool,
}

/// Narrow search capability over a context store.
pub trait ContextSearch {
    /// Entries whose content (and optionally serialized metadata) contains
    /// `query` as a case-sensitive substring, in insertion order.
    fn search_contexts(&self, query: &str, options: SearchOptions) -> Vec<&ContextEntry>;
}
