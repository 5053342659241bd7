//! # Memwell Core
//!
//! Domain types, error taxonomy, and the scoring policy for the memwell
//! context memory engine. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The durable storage seam is defined as a trait here (`ContextLedger`).
//! Implementations live in their own crates. This enables:
//! - Swapping persistence backends via configuration
//! - Easy testing with in-memory stand-ins
//! - Clean dependency graph (all crates depend inward on core)

pub mod entry;
pub mod error;
pub mod ledger;
pub mod lineage;
pub mod scoring;
pub mod session;
pub mod summary;

// Re-export key types at crate root for ergonomics
pub use entry::{ContextEntry, ContextKind, EntryMetadata, EntryPatch};
pub use error::{Error, LedgerError, Result, StoreError};
pub use ledger::{ContextLedger, NewLineage, NewSummary, TrimReport};
pub use lineage::LineageRecord;
pub use scoring::ScoringPolicy;
pub use session::{Session, SessionMode};
pub use summary::{Summary, SummaryMethod};
