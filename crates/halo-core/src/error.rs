//! Error kinds shared across the engine

use thiserror::Error;

/// Engine-wide error type
///
/// Only `Conflict` is recoverable (one retry after re-blocking); everything
/// else propagates. Every mutating error path writes an audit entry before
/// returning.
#[derive(Debug, Error)]
pub enum HaloError {
    /// Malformed identifier, illegal date, failing checksum
    #[error("validation failed: {0}")]
    Validation(String),

    /// Entity or mention absent by id
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-constraint race (duplicate identifier, duplicate live fact)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Decryption tag mismatch, unknown ciphertext prefix, missing key
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Audit chain verification failure; non-recoverable in situ
    #[error("audit chain integrity violated at sequence {0}")]
    Integrity(i64),

    /// Bounded work exceeded its budget
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Driver or connection fault
    #[error("storage error: {0}")]
    Storage(String),
}

impl HaloError {
    /// True when the caller may retry once after re-blocking
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
