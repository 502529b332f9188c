//! Swedish street-address parsing and abbreviation

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Postal code: five digits with an optional internal space
static POSTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{3})\s?(\d{2})").expect("postal regex is valid"));

/// Street number with optional uppercase entrance letter
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)[\s,]+(\d+)\s*([A-ZÅÄÖ])?$").expect("number regex is valid"));

/// Common street-suffix abbreviations, longest first
const SUFFIXES: &[(&str, &str)] = &[
    ("GATAN", "G"),
    ("VÄGEN", "V"),
    ("ALLÉN", "A"),
    ("STIGEN", "ST"),
    ("GRÄND", "GR"),
    ("PLAN", "PL"),
    ("PLATS", "PL"),
    ("TORG", "T"),
    ("BACKE", "B"),
];

/// A parsed street address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub entrance: Option<String>,
    /// `NNN NN`
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// Abbreviated single-line form used for comparison
    pub normalized: String,
}

/// Parse a free-form Swedish address line
///
/// The postal code splits off the trailing city; a trailing number with an
/// optional entrance letter splits off from the street; street suffixes are
/// abbreviated in the normalized form.
pub fn parse_address(input: &str) -> ParsedAddress {
    let upper = input.to_uppercase();

    let (before_postal, postal_code, city) = match POSTAL_RE.find_iter(&upper).last() {
        Some(m) => {
            let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
            let code = format!("{} {}", &digits[..3], &digits[3..]);
            let city_part = upper[m.end()..]
                .trim_matches(|c: char| c.is_whitespace() || c == ',')
                .to_string();
            let city = (!city_part.is_empty()).then_some(city_part);
            (upper[..m.start()].to_string(), Some(code), city)
        }
        None => (upper.clone(), None, None),
    };

    let street_part = before_postal
        .trim_matches(|c: char| c.is_whitespace() || c == ',')
        .to_string();

    let (street, street_number, entrance) = match NUMBER_RE.captures(&street_part) {
        Some(caps) => {
            let street = caps[1]
                .trim_matches(|c: char| c.is_whitespace() || c == ',')
                .to_string();
            let number = caps[2].to_string();
            let entrance = caps.get(3).map(|m| m.as_str().to_string());
            ((!street.is_empty()).then_some(street), Some(number), entrance)
        }
        None => ((!street_part.is_empty()).then_some(street_part), None, None),
    };

    let abbreviated = street.as_deref().map(abbreviate_street);

    let mut normalized = String::new();
    if let Some(s) = &abbreviated {
        normalized.push_str(s);
    }
    if let Some(n) = &street_number {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(n);
        if let Some(e) = &entrance {
            normalized.push_str(e);
        }
    }
    if let Some(p) = &postal_code {
        if !normalized.is_empty() {
            normalized.push_str(", ");
        }
        normalized.push_str(p);
        if let Some(c) = &city {
            normalized.push(' ');
            normalized.push_str(c);
        }
    } else if let Some(c) = &city {
        if !normalized.is_empty() {
            normalized.push_str(", ");
        }
        normalized.push_str(c);
    }

    ParsedAddress {
        street,
        street_number,
        entrance,
        postal_code,
        city,
        normalized,
    }
}

/// Abbreviate recognized suffixes on each street token
pub fn abbreviate_street(street: &str) -> String {
    street
        .split_whitespace()
        .map(|token| {
            for (suffix, abbrev) in SUFFIXES {
                if let Some(stem) = token.strip_suffix(suffix) {
                    return format!("{stem}{abbrev}");
                }
            }
            token.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_address() {
        let a = parse_address("Storgatan 12A, 111 22 Stockholm");
        assert_eq!(a.street.as_deref(), Some("STORGATAN"));
        assert_eq!(a.street_number.as_deref(), Some("12"));
        assert_eq!(a.entrance.as_deref(), Some("A"));
        assert_eq!(a.postal_code.as_deref(), Some("111 22"));
        assert_eq!(a.city.as_deref(), Some("STOCKHOLM"));
        assert_eq!(a.normalized, "STORG 12A, 111 22 STOCKHOLM");
    }

    #[test]
    fn postal_code_with_and_without_space() {
        let spaced = parse_address("Kungsvägen 3, 414 51 Göteborg");
        let compact = parse_address("Kungsvägen 3, 41451 Göteborg");
        assert_eq!(spaced.postal_code, compact.postal_code);
        assert_eq!(spaced.normalized, compact.normalized);
    }

    #[test]
    fn abbreviates_common_suffixes() {
        assert_eq!(abbreviate_street("STORGATAN"), "STORG");
        assert_eq!(abbreviate_street("KUNGSVÄGEN"), "KUNGSV");
        assert_eq!(abbreviate_street("LINDALLÉN"), "LINDA");
        assert_eq!(abbreviate_street("KYRKSTIGEN"), "KYRKST");
        assert_eq!(abbreviate_street("ÖSTRA GRÄND"), "ÖSTRA GR");
        assert_eq!(abbreviate_street("STORTORG"), "STORT");
        assert_eq!(abbreviate_street("SOLBACKE"), "SOLB");
    }

    #[test]
    fn tolerates_missing_parts() {
        let no_number = parse_address("Storgatan, 111 22 Stockholm");
        assert_eq!(no_number.street.as_deref(), Some("STORGATAN"));
        assert!(no_number.street_number.is_none());

        let street_only = parse_address("Storgatan 5");
        assert_eq!(street_only.street.as_deref(), Some("STORGATAN"));
        assert_eq!(street_only.street_number.as_deref(), Some("5"));
        assert!(street_only.postal_code.is_none());
        assert_eq!(street_only.normalized, "STORG 5");
    }

    #[test]
    fn parsing_normalized_output_keeps_structure() {
        let once = parse_address("Storgatan 12A, 111 22 Stockholm");
        let twice = parse_address(&once.normalized);
        assert_eq!(twice.postal_code, once.postal_code);
        assert_eq!(twice.street_number, once.street_number);
        assert_eq!(twice.entrance, once.entrance);
        assert_eq!(twice.city, once.city);
    }
}
