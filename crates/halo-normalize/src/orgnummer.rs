//! Organisationsnummer validation
//!
//! Ten digits after normalization; the third digit is >= 2, which is what
//! separates an organisation from a personnummer. A 12-digit form with the
//! leading `16` century marker is accepted and stripped.

use serde::{Deserialize, Serialize};

use crate::{luhn_valid, strip_separators, NormalizeError};

/// Validated organisationsnummer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgnummerInfo {
    /// Canonical 10-digit form
    pub normalized: String,
}

impl OrgnummerInfo {
    /// Legal-entity group encoded in the first digit, where assigned
    pub fn entity_group(&self) -> Option<&'static str> {
        match self.normalized.as_bytes().first()? {
            b'2' => Some("stat, landsting, kommun"),
            b'5' => Some("aktiebolag"),
            b'7' => Some("ekonomisk förening"),
            b'8' => Some("ideell förening, stiftelse"),
            b'9' => Some("handelsbolag, kommanditbolag"),
            _ => None,
        }
    }
}

/// Validate and normalize an organisationsnummer
pub fn parse_orgnummer(value: &str) -> Result<OrgnummerInfo, NormalizeError> {
    let (mut digits, _) = strip_separators(value)?;

    // 16-prefixed 12-digit form used by some registries
    if digits.len() == 12 && digits[0] == 1 && digits[1] == 6 {
        digits.drain(..2);
    }

    if digits.len() != 10 {
        return Err(NormalizeError::InvalidLength(digits.len()));
    }

    if digits[2] < 2 {
        return Err(NormalizeError::InvalidFormat(
            "third digit below 2: not an organisation".to_string(),
        ));
    }

    if !luhn_valid(&digits) {
        return Err(NormalizeError::InvalidChecksum);
    }

    let normalized: String = digits.iter().map(|&d| (b'0' + d) as char).collect();
    Ok(OrgnummerInfo { normalized })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_dashed_and_prefixed() {
        for shape in ["5566778899", "556677-8899", "165566778899"] {
            let info = parse_orgnummer(shape).unwrap();
            assert_eq!(info.normalized, "5566778899", "shape {shape}");
        }
    }

    #[test]
    fn entity_group_from_first_digit() {
        let info = parse_orgnummer("5566778899").unwrap();
        assert_eq!(info.entity_group(), Some("aktiebolag"));
    }

    #[test]
    fn rejects_personnummer_shaped_input() {
        // third digit 1 < 2: this is a personnummer, not an organisation
        let err = parse_orgnummer("8112189876").unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidFormat(_)));
    }

    #[test]
    fn rejects_bad_checksum_and_length() {
        assert_eq!(
            parse_orgnummer("5566778898"),
            Err(NormalizeError::InvalidChecksum)
        );
        assert_eq!(
            parse_orgnummer("55667788"),
            Err(NormalizeError::InvalidLength(8))
        );
    }
}
