//! PII column codec: encryption plus blind index in one step

use halo_crypto::{BlindIndexer, FieldCipher, KeySet};
use halo_core::HaloError;

/// Encrypts identifier values and derives their equality indexes
///
/// Every identifier column stores `enc2:` ciphertext next to a 32-hex-char
/// blind index; lookups never touch plaintext.
pub struct PiiCodec {
    cipher: FieldCipher,
    indexer: BlindIndexer,
}

impl PiiCodec {
    pub fn new(keys: &KeySet) -> Self {
        Self {
            cipher: FieldCipher::new(keys.pii_encryption()),
            indexer: BlindIndexer::new(keys.blind_index()),
        }
    }

    /// (ciphertext, blind index) for storage
    pub fn protect(&self, plaintext: &str) -> Result<(String, String), HaloError> {
        let cipher = self
            .cipher
            .encrypt(plaintext)
            .map_err(|e| HaloError::Crypto(e.to_string()))?;
        Ok((cipher, self.indexer.index(plaintext)))
    }

    /// Blind index alone, for equality lookups
    pub fn lookup_index(&self, plaintext: &str) -> String {
        self.indexer.index(plaintext)
    }

    /// Decrypt a stored ciphertext
    pub fn reveal(&self, stored: &str) -> Result<String, HaloError> {
        self.cipher
            .decrypt(stored)
            .map_err(|e| HaloError::Crypto(e.to_string()))
    }
}
