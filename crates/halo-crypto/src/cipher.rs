//! AES-256-GCM field encryption with the `enc2:` wire format

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::CryptoError;

const PREFIX: &str = "enc2:";
const LEGACY_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;

/// Authenticated encryption for PII columns
///
/// Ciphertext is ASCII, storable in text columns:
/// `enc2:` + base64url(nonce) + `:` + base64url(ciphertext || tag).
/// The nonce is uniformly random per encryption; associated data is empty.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Malformed)?;
        Ok(format!(
            "{PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(&ciphertext)
        ))
    }

    /// Decrypt a stored `enc2:` value
    ///
    /// Tag mismatch is a hard error, never a silent null. The legacy `enc:`
    /// prefix is refused explicitly.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        if stored.starts_with(LEGACY_PREFIX) && !stored.starts_with(PREFIX) {
            return Err(CryptoError::LegacyPrefix);
        }
        let rest = stored
            .strip_prefix(PREFIX)
            .ok_or(CryptoError::UnknownPrefix)?;
        let (nonce_b64, ct_b64) = rest.split_once(':').ok_or(CryptoError::Malformed)?;

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| CryptoError::Malformed)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ct_b64)
            .map_err(|_| CryptoError::Malformed)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::TagMismatch)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(byte: u8) -> FieldCipher {
        FieldCipher::new(&[byte; 32])
    }

    #[test]
    fn round_trip() {
        let c = cipher(1);
        let stored = c.encrypt("198112189876").unwrap();
        assert!(stored.starts_with("enc2:"));
        assert!(stored.is_ascii());
        assert_eq!(c.decrypt(&stored).unwrap(), "198112189876");
    }

    #[test]
    fn nonces_are_unique_per_encryption() {
        let c = cipher(1);
        let a = c.encrypt("same plaintext").unwrap();
        let b = c.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_hard() {
        let stored = cipher(1).encrypt("5566778899").unwrap();
        assert_eq!(cipher(2).decrypt(&stored), Err(CryptoError::TagMismatch));
    }

    #[test]
    fn tampered_ciphertext_fails_hard() {
        let c = cipher(1);
        let stored = c.encrypt("5566778899").unwrap();
        let mut tampered = stored.clone();
        // flip the final ciphertext character
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(c.decrypt(&tampered).is_err());
    }

    #[test]
    fn legacy_prefix_is_refused() {
        assert_eq!(
            cipher(1).decrypt("enc:AAAA:BBBB"),
            Err(CryptoError::LegacyPrefix)
        );
    }

    #[test]
    fn unknown_prefix_is_refused() {
        assert_eq!(
            cipher(1).decrypt("plaintext-value"),
            Err(CryptoError::UnknownPrefix)
        );
    }
}
