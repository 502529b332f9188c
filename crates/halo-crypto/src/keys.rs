//! Master key intake and HKDF domain separation

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

const PII_ENCRYPTION_INFO: &[u8] = b"halo-pii-encryption-v1";
const BLIND_INDEX_INFO: &[u8] = b"halo-pii-blind-index-v1";
const AUDIT_CHAIN_INFO: &[u8] = b"halo-audit-chain-v1";

/// The single master key supplied at process start
///
/// Must carry full 256-bit entropy: HKDF below runs with an empty salt,
/// which is only acceptable for uniformly random master keys. A deployment
/// deriving the master key from anything weaker must substitute a random
/// salt persisted alongside the corpus.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| CryptoError::InvalidKey("master key is not valid hex".to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("master key must be 32 bytes".to_string()))?;
        Ok(Self(arr))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Purpose-separated keys derived from the master key
///
/// Purposes never share keys; the info strings are part of the wire
/// contract and versioned.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    pii_encryption: [u8; 32],
    blind_index: [u8; 32],
    audit_chain: [u8; 32],
}

impl KeySet {
    /// Derive all purpose keys with HKDF-SHA256
    pub fn derive(master: &MasterKey) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, &master.0);
        let mut keys = Self {
            pii_encryption: [0u8; 32],
            blind_index: [0u8; 32],
            audit_chain: [0u8; 32],
        };
        for (info, out) in [
            (PII_ENCRYPTION_INFO, &mut keys.pii_encryption),
            (BLIND_INDEX_INFO, &mut keys.blind_index),
            (AUDIT_CHAIN_INFO, &mut keys.audit_chain),
        ] {
            hk.expand(info, out)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        }
        Ok(keys)
    }

    pub fn pii_encryption(&self) -> &[u8; 32] {
        &self.pii_encryption
    }

    pub fn blind_index(&self) -> &[u8; 32] {
        &self.blind_index
    }

    pub fn audit_chain(&self) -> &[u8; 32] {
        &self.audit_chain
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeySet(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let master = MasterKey::from_bytes([7u8; 32]);
        let a = KeySet::derive(&master).unwrap();
        let b = KeySet::derive(&master).unwrap();
        assert_eq!(a.pii_encryption(), b.pii_encryption());
        assert_eq!(a.blind_index(), b.blind_index());
        assert_eq!(a.audit_chain(), b.audit_chain());
    }

    #[test]
    fn purposes_never_share_keys() {
        let keys = KeySet::derive(&MasterKey::from_bytes([7u8; 32])).unwrap();
        assert_ne!(keys.pii_encryption(), keys.blind_index());
        assert_ne!(keys.blind_index(), keys.audit_chain());
        assert_ne!(keys.pii_encryption(), keys.audit_chain());
    }

    #[test]
    fn different_masters_diverge() {
        let a = KeySet::derive(&MasterKey::from_bytes([1u8; 32])).unwrap();
        let b = KeySet::derive(&MasterKey::from_bytes([2u8; 32])).unwrap();
        assert_ne!(a.pii_encryption(), b.pii_encryption());
    }

    #[test]
    fn hex_intake_validates_length() {
        assert!(MasterKey::from_hex(&"ab".repeat(32)).is_ok());
        assert!(MasterKey::from_hex("abcd").is_err());
        assert!(MasterKey::from_hex("not-hex").is_err());
    }
}
