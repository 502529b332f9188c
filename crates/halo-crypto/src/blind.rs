//! Keyed blind index for equality lookups over encrypted fields

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Truncation to 128 bits is part of the wire contract
const INDEX_BYTES: usize = 16;

/// Deterministic, keyed equality index
///
/// Plain SHA-256 over a ~12M-value identifier space is rainbow-table fodder;
/// the keyed HMAC under a domain-separated key is not computable without the
/// key.
pub struct BlindIndexer {
    key: [u8; 32],
}

impl BlindIndexer {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { key: *key }
    }

    /// 32 lowercase hex chars over the normalized plaintext
    pub fn index(&self, plaintext: &str) -> String {
        let normalized: String = plaintext
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(normalized.as_bytes());
        let tag = mac.finalize().into_bytes();
        hex::encode(&tag[..INDEX_BYTES])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_plaintext_same_index() {
        let indexer = BlindIndexer::new(&[9u8; 32]);
        assert_eq!(indexer.index("198112189876"), indexer.index("198112189876"));
    }

    #[test]
    fn normalization_ignores_dashes_whitespace_and_case() {
        let indexer = BlindIndexer::new(&[9u8; 32]);
        assert_eq!(
            indexer.index("19811218-9876"),
            indexer.index(" 198112189876 ")
        );
        assert_eq!(indexer.index("ABC123"), indexer.index("abc123"));
    }

    #[test]
    fn different_keys_diverge() {
        let a = BlindIndexer::new(&[1u8; 32]);
        let b = BlindIndexer::new(&[2u8; 32]);
        assert_ne!(a.index("198112189876"), b.index("198112189876"));
    }

    #[test]
    fn output_is_32_lowercase_hex_chars() {
        let index = BlindIndexer::new(&[9u8; 32]).index("5566778899");
        assert_eq!(index.len(), 32);
        assert!(index.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }
}
