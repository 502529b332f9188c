//! # Halo Normalize
//!
//! Pure Swedish normalizers: personnummer, organisationsnummer, company
//! names, and street addresses. Deterministic, no I/O; every normalizer is a
//! fixed point on its own output.
//!
//! ## Quick Start
//!
//! ```rust
//! use halo_normalize::{parse_personnummer_at, normalize_company_name};
//!
//! let info = parse_personnummer_at("811218-9876", 2026).unwrap();
//! assert_eq!(info.normalized, "198112189876");
//!
//! let name = normalize_company_name("Test Aktiebolag i likvidation");
//! assert_eq!(name.normalized, "TEST");
//! ```

pub mod address;
pub mod company;
pub mod orgnummer;
pub mod personnummer;
pub mod phonetic;

pub use address::{parse_address, ParsedAddress};
pub use company::{normalize_company_name, LegalForm, NormalizedCompanyName};
pub use orgnummer::{parse_orgnummer, OrgnummerInfo};
pub use personnummer::{
    parse_personnummer, parse_personnummer_at, Gender, PersonnummerInfo,
};
pub use phonetic::phonetic_code;

use thiserror::Error;

/// Normalization failure kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("invalid length: expected 10 or 12 digits, got {0}")]
    InvalidLength(usize),

    #[error("non-numeric input")]
    NonNumeric,

    #[error("invalid calendar date")]
    InvalidDate,

    #[error("invalid checksum")]
    InvalidChecksum,

    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Luhn checksum over a 10-digit identifier (personnummer short form or
/// organisationsnummer)
///
/// Weights 2,1,2,1,2,1,2,1,2 over the first nine digits, digit-summing each
/// product; the expected check digit is `(10 - sum mod 10) mod 10`.
pub(crate) fn luhn_valid(digits: &[u8]) -> bool {
    debug_assert_eq!(digits.len(), 10);
    let mut sum = 0u32;
    for (i, &d) in digits.iter().take(9).enumerate() {
        let weight = if i % 2 == 0 { 2 } else { 1 };
        let product = u32::from(d) * weight;
        sum += product / 10 + product % 10;
    }
    let expected = (10 - sum % 10) % 10;
    expected == u32::from(digits[9])
}

/// Strip `-`, `+`, and whitespace; reject anything else non-numeric.
/// Returns the digit values and whether a `+` separator was seen.
pub(crate) fn strip_separators(value: &str) -> Result<(Vec<u8>, bool), NormalizeError> {
    let mut digits = Vec::with_capacity(12);
    let mut has_plus = false;
    for c in value.chars() {
        match c {
            '0'..='9' => digits.push(c as u8 - b'0'),
            '-' => {}
            '+' => has_plus = true,
            c if c.is_whitespace() => {}
            _ => return Err(NormalizeError::NonNumeric),
        }
    }
    Ok((digits, has_plus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luhn_accepts_known_good_numbers() {
        // 8112189876 and 5566778899 are textbook-valid
        let digits: Vec<u8> = "8112189876".bytes().map(|b| b - b'0').collect();
        assert!(luhn_valid(&digits));
        let digits: Vec<u8> = "5566778899".bytes().map(|b| b - b'0').collect();
        assert!(luhn_valid(&digits));
    }

    #[test]
    fn luhn_rejects_mutated_digit() {
        let digits: Vec<u8> = "8112189875".bytes().map(|b| b - b'0').collect();
        assert!(!luhn_valid(&digits));
    }

    #[test]
    fn strip_separators_flags_plus() {
        let (digits, plus) = strip_separators("811218+9876").unwrap();
        assert_eq!(digits.len(), 10);
        assert!(plus);
        assert!(strip_separators("81121X9876").is_err());
    }
}
