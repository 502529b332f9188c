//! # Halo Crypto
//!
//! Confidentiality and integrity primitives for the Halo corpus:
//!
//! - [`MasterKey`] / [`KeySet`] — HKDF-SHA256 domain separation; one master
//!   key in, three purpose keys out, never shared across purposes
//! - [`FieldCipher`] — AES-256-GCM over PII columns, `enc2:` wire format
//! - [`BlindIndexer`] — keyed, deterministic equality index over encrypted
//!   fields, truncated to 128 bits
//! - [`ChainHasher`] — HMAC-SHA256 hash chain over canonical (RFC 8785) JSON
//!   for the append-only audit log
//!
//! Key material lives in memory only and is zeroized on drop. Nothing in
//! this crate logs plaintext or key bytes.

pub mod blind;
pub mod chain;
pub mod cipher;
pub mod keys;

pub use blind::BlindIndexer;
pub use chain::{ChainHasher, GENESIS_HASH};
pub use cipher::FieldCipher;
pub use keys::{KeySet, MasterKey};

use thiserror::Error;

/// Crypto failure kinds; never silently masked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("unknown ciphertext prefix")]
    UnknownPrefix,

    #[error("legacy 'enc:' ciphertext is not readable; re-encrypt under enc2")]
    LegacyPrefix,

    #[error("malformed ciphertext")]
    Malformed,

    #[error("decryption failed: authentication tag mismatch")]
    TagMismatch,

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}
