//! Error types for the memwell domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Validation errors are
//! synchronous and caller-correctable; storage errors degrade persistence
//! without blocking the working tier.

use thiserror::Error;

/// The top-level error type for all memwell operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Working store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Durable ledger errors ---
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the in-process working context store.
///
/// All of these are validation or not-found conditions: synchronous,
/// caller-correctable, never auto-retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entry id must not be empty")]
    InvalidId,

    #[error("Duplicate entry id: {0}")]
    DuplicateId(String),

    #[error("Content length {len} exceeds the configured maximum of {max} characters")]
    SizeLimitExceeded { len: usize, max: usize },

    #[error("Unrecognized context kind: {0}")]
    InvalidType(String),

    #[error("No entry with id: {0}")]
    NotFound(String),

    #[error("Malformed context JSON: {0}")]
    Parse(String),
}

/// Errors from the durable, session-scoped context ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(
        "Out-of-order summary for layer {layer}: covers_until {covers_until} precedes the latest boundary {latest}"
    )]
    OutOfOrderSummary {
        layer: u32,
        covers_until: String,
        latest: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::SizeLimitExceeded {
            len: 600_000,
            max: 500_000,
        });
        assert!(err.to_string().contains("600000"));
        assert!(err.to_string().contains("500000"));
    }

    #[test]
    fn out_of_order_summary_names_boundaries() {
        let err = Error::Ledger(LedgerError::OutOfOrderSummary {
            layer: 0,
            covers_until: "2026-01-01T00:00:00Z".into(),
            latest: "2026-02-01T00:00:00Z".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("layer 0"));
        assert!(msg.contains("2026-01-01"));
        assert!(msg.contains("2026-02-01"));
    }

    #[test]
    fn duplicate_id_is_comparable() {
        assert_eq!(
            StoreError::DuplicateId("f1".into()),
            StoreError::DuplicateId("f1".into())
        );
    }
}
