//! Durable context ledger for memwell, backed by SQLite.
//!
//! One database file holds four tables: `sessions`, `entries`, `summaries`,
//! and `lineage`. The ledger computes hybrid importance/recency scores for
//! ranking and token-budget trimming, enforces the summary-tier ordering
//! invariant, and records response lineage.
//!
//! WAL journal mode gives readers snapshot isolation against a concurrent
//! trim; writes are additionally serialized per session id.

mod lineage;
mod sqlite;
mod tiers;

pub use sqlite::SqliteLedger;
