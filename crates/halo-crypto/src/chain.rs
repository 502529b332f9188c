//! HMAC hash chain over canonical JSON for the append-only audit log

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// previous_hash of the first chain entry
pub const GENESIS_HASH: &str = "GENESIS";

/// Computes and verifies audit-chain entry hashes
///
/// `entry_hash = HMAC-SHA256(audit_key, previous_hash || jcs(body))` where
/// `body` is the canonical RFC 8785 JSON of the entry fields including
/// `previous_hash`.
pub struct ChainHasher {
    key: [u8; 32],
}

impl ChainHasher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { key: *key }
    }

    pub fn entry_hash(
        &self,
        previous_hash: &str,
        body: &serde_json::Value,
    ) -> Result<String, CryptoError> {
        let canonical =
            serde_jcs::to_vec(body).map_err(|e| CryptoError::Canonicalization(e.to_string()))?;
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(previous_hash.as_bytes());
        mac.update(&canonical);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison of a recomputed hash against the stored one
    pub fn verify_entry(
        &self,
        previous_hash: &str,
        body: &serde_json::Value,
        stored_hash: &str,
    ) -> Result<bool, CryptoError> {
        let computed = self.entry_hash(previous_hash, body)?;
        Ok(bool::from(
            computed.as_bytes().ct_eq(stored_hash.as_bytes()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_deterministic_and_key_ordering_is_canonical() {
        let hasher = ChainHasher::new(&[3u8; 32]);
        let a = json!({"b": 1, "a": "x", "previous_hash": GENESIS_HASH});
        let b = json!({"previous_hash": GENESIS_HASH, "a": "x", "b": 1});
        assert_eq!(
            hasher.entry_hash(GENESIS_HASH, &a).unwrap(),
            hasher.entry_hash(GENESIS_HASH, &b).unwrap()
        );
    }

    #[test]
    fn mutated_body_fails_verification() {
        let hasher = ChainHasher::new(&[3u8; 32]);
        let body = json!({"previous_hash": GENESIS_HASH, "event": "ENTITY_CREATED"});
        let hash = hasher.entry_hash(GENESIS_HASH, &body).unwrap();
        assert!(hasher.verify_entry(GENESIS_HASH, &body, &hash).unwrap());

        let tampered = json!({"previous_hash": GENESIS_HASH, "event": "ENTITY_ANONYMIZED"});
        assert!(!hasher.verify_entry(GENESIS_HASH, &tampered, &hash).unwrap());
    }

    #[test]
    fn different_keys_diverge() {
        let body = json!({"previous_hash": GENESIS_HASH, "n": 1});
        let a = ChainHasher::new(&[1u8; 32]).entry_hash(GENESIS_HASH, &body).unwrap();
        let b = ChainHasher::new(&[2u8; 32]).entry_hash(GENESIS_HASH, &body).unwrap();
        assert_ne!(a, b);
    }
}
