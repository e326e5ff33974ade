//! Error types for VaultKV
//!
//! Provides a unified error type for all operations. Every error is
//! synchronous and fail-fast: a rejected call leaves all structures
//! unchanged, and nothing is retried internally.

use thiserror::Error;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for VaultKV operations
#[derive(Debug, Error)]
pub enum VaultError {
    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Bounds error: {0}")]
    Bounds(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    /// A unique index would gain a second primary key for one index value.
    #[error("Duplicate index entry: {0}")]
    DuplicateIndex(String),

    /// A delete/update named a (key, index value) association the index
    /// does not currently hold.
    #[error("Inconsistent index: {0}")]
    InconsistentIndex(String),

    // -------------------------------------------------------------------------
    // Lifecycle / State Errors
    // -------------------------------------------------------------------------
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Mutation attempted against a read-only committed view.
    #[error("Not supported: {0}")]
    NotSupported(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// Corrupt stored data: bad dump magic/version/checksum, or an entry
    /// that fails to decompress.
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
