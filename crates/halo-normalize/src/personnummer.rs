//! Personnummer and samordningsnummer validation
//!
//! Accepts `YYYYMMDD-XXXX`, `YYYYMMDDXXXX`, `YYMMDD-XXXX`, `YYMMDDXXXX`,
//! with `+` in place of `-` marking a bearer of 100 years or more.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{luhn_valid, strip_separators, NormalizeError};

/// Gender encoded in the ninth digit (odd = male, even = female)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// Validated personnummer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonnummerInfo {
    /// Canonical 12-digit form
    pub normalized: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    /// Day component was 61–91: a samordningsnummer, not a personnummer
    pub is_samordningsnummer: bool,
}

/// Validate against the current year's century window
pub fn parse_personnummer(value: &str) -> Result<PersonnummerInfo, NormalizeError> {
    parse_personnummer_at(value, Utc::now().year())
}

/// Validate with an explicit reference year for century expansion
pub fn parse_personnummer_at(
    value: &str,
    reference_year: i32,
) -> Result<PersonnummerInfo, NormalizeError> {
    let (digits, has_plus) = strip_separators(value)?;

    let (year, rest) = match digits.len() {
        12 => {
            let year = digits[..4].iter().fold(0i32, |acc, &d| acc * 10 + i32::from(d));
            (year, &digits[2..])
        }
        10 => {
            let yy = i32::from(digits[0]) * 10 + i32::from(digits[1]);
            let current_yy = reference_year % 100;
            let mut year = if yy <= current_yy { 2000 + yy } else { 1900 + yy };
            if has_plus {
                // The bearer is at least 100: previous century regardless
                // of the current-year comparison
                year -= 100;
            }
            (year, &digits[..])
        }
        n => return Err(NormalizeError::InvalidLength(n)),
    };

    // rest is the 10-digit portion: YYMMDDXXXC
    let month = u32::from(rest[2]) * 10 + u32::from(rest[3]);
    let raw_day = u32::from(rest[4]) * 10 + u32::from(rest[5]);
    let (day, is_samordningsnummer) = if raw_day > 60 {
        (raw_day - 60, true)
    } else {
        (raw_day, false)
    };

    let birth_date =
        NaiveDate::from_ymd_opt(year, month, day).ok_or(NormalizeError::InvalidDate)?;

    if !luhn_valid(rest) {
        return Err(NormalizeError::InvalidChecksum);
    }

    let gender = if rest[8] % 2 == 1 {
        Gender::Male
    } else {
        Gender::Female
    };

    let mut normalized = String::with_capacity(12);
    normalized.push_str(&format!("{year:04}"));
    for &d in &rest[2..] {
        normalized.push((b'0' + d) as char);
    }

    Ok(PersonnummerInfo {
        normalized,
        birth_date,
        gender,
        is_samordningsnummer,
    })
}

impl PersonnummerInfo {
    /// Ten-digit short form with the century-appropriate separator
    pub fn format_short(&self, reference_year: i32) -> String {
        let year: i32 = self.normalized[..4].parse().unwrap_or(reference_year);
        let separator = if reference_year - year >= 100 { '+' } else { '-' };
        format!(
            "{}{}{}",
            &self.normalized[2..8],
            separator,
            &self.normalized[8..]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REF_YEAR: i32 = 2026;

    #[test]
    fn parses_every_accepted_shape_to_the_same_canonical() {
        let canonical = "198112189876";
        for shape in [
            "198112189876",
            "19811218-9876",
            "8112189876",
            "811218-9876",
        ] {
            let info = parse_personnummer_at(shape, REF_YEAR).unwrap();
            assert_eq!(info.normalized, canonical, "shape {shape}");
            assert_eq!(
                info.birth_date,
                NaiveDate::from_ymd_opt(1981, 12, 18).unwrap()
            );
            assert!(!info.is_samordningsnummer);
        }
    }

    #[test]
    fn gender_is_parity_of_ninth_digit() {
        let info = parse_personnummer_at("198112189876", REF_YEAR).unwrap();
        // ninth digit of 8112189876 is 7: male
        assert_eq!(info.gender, Gender::Male);
    }

    #[test]
    fn plus_separator_flips_century() {
        // Without +, 26 <= 26 expands to 2026; with + the bearer is >= 100
        let with_plus = parse_personnummer_at("260101+0206", REF_YEAR).unwrap();
        assert!(with_plus.normalized.starts_with("1926"));
        let with_dash = parse_personnummer_at("260101-0206", REF_YEAR).unwrap();
        assert!(with_dash.normalized.starts_with("2026"));
    }

    #[test]
    fn samordningsnummer_day_is_shifted_back() {
        // day 78 = 18 + 60
        let info = parse_personnummer_at("198112789873", REF_YEAR).unwrap();
        assert!(info.is_samordningsnummer);
        assert_eq!(
            info.birth_date,
            NaiveDate::from_ymd_opt(1981, 12, 18).unwrap()
        );
        // normalized keeps the raw day
        assert_eq!(info.normalized, "198112789873");
    }

    #[test]
    fn rejects_each_failure_kind() {
        assert_eq!(
            parse_personnummer_at("81121898", REF_YEAR),
            Err(NormalizeError::InvalidLength(8))
        );
        assert_eq!(
            parse_personnummer_at("81121X-9876", REF_YEAR),
            Err(NormalizeError::NonNumeric)
        );
        assert_eq!(
            parse_personnummer_at("19811318-9876", REF_YEAR),
            Err(NormalizeError::InvalidDate)
        );
        assert_eq!(
            parse_personnummer_at("19811218-9875", REF_YEAR),
            Err(NormalizeError::InvalidChecksum)
        );
    }

    #[test]
    fn short_format_round_trips() {
        let info = parse_personnummer_at("198112189876", REF_YEAR).unwrap();
        let short = info.format_short(REF_YEAR);
        assert_eq!(short, "811218-9876");
        let back = parse_personnummer_at(&short, REF_YEAR).unwrap();
        assert_eq!(back, info);
    }

    proptest::proptest! {
        /// Any checksum-corrected candidate round-trips through every shape
        #[test]
        fn round_trip_all_shapes(
            year in 1940i32..=2005,
            month in 1u32..=12,
            day in 1u32..=28,
            serial in 0u32..=999,
        ) {
            let yy = year % 100;
            let body = format!("{yy:02}{month:02}{day:02}{serial:03}");
            let mut digits: Vec<u8> = body.bytes().map(|b| b - b'0').collect();
            // compute the check digit the same way the validator expects
            let mut sum = 0u32;
            for (i, &d) in digits.iter().enumerate() {
                let w = if i % 2 == 0 { 2 } else { 1 };
                let p = u32::from(d) * w;
                sum += p / 10 + p % 10;
            }
            digits.push((((10 - sum % 10) % 10) as u8));
            let ten: String = digits.iter().map(|&d| (b'0' + d) as char).collect();
            let canonical = format!("{year:04}{}", &ten[2..]);

            for shape in [
                canonical.clone(),
                format!("{}-{}", &canonical[..8], &canonical[8..]),
                ten.clone(),
                format!("{}-{}", &ten[..6], &ten[6..]),
            ] {
                let info = parse_personnummer_at(&shape, 2026).unwrap();
                proptest::prop_assert_eq!(&info.normalized, &canonical);
            }
        }
    }
}
