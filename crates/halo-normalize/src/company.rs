//! Company-name normalization: legal-form detection and stripping

use serde::{Deserialize, Serialize};

/// Swedish legal forms recognized in company names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegalForm {
    /// Aktiebolag
    Ab,
    /// Handelsbolag
    Hb,
    /// Kommanditbolag
    Kb,
    /// Enskild firma
    Ef,
    /// Ekonomisk förening
    EkFor,
    /// Ideell förening
    IdeellFor,
    /// Stiftelse
    Stiftelse,
}

impl LegalForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ab => "AB",
            Self::Hb => "HB",
            Self::Kb => "KB",
            Self::Ef => "EF",
            Self::EkFor => "EK FÖR",
            Self::IdeellFor => "IDEELL FÖR",
            Self::Stiftelse => "STIFTELSE",
        }
    }
}

/// Result of company-name normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCompanyName {
    /// Uppercased, status-stripped, legal-form-stripped, whitespace-collapsed
    pub normalized: String,
    pub legal_form: Option<LegalForm>,
}

/// Status indicators removed wherever they occur
const STATUS_INDICATORS: &[&str] = &[
    "I LIKVIDATION",
    "I KONKURS",
    "UNDER REKONSTRUKTION",
    "UNDER AVVECKLING",
    "(PUBL)",
];

/// Normalize a company name
///
/// Uppercase, strip status indicators, drop punctuation except `&`, collapse
/// whitespace, then detect and remove trailing legal-form tokens. STIFTELSE
/// is detected but preserved in the name. If stripping would leave the name
/// empty, the tokens are kept.
pub fn normalize_company_name(name: &str) -> NormalizedCompanyName {
    let mut upper = name.to_uppercase();

    for indicator in STATUS_INDICATORS {
        while let Some(pos) = upper.find(indicator) {
            upper.replace_range(pos..pos + indicator.len(), " ");
        }
    }

    // punctuation drops to whitespace; & is meaningful in firm names
    let cleaned: String = upper
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '&' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    // bare trailing PUBL survives the parenthesized form above
    if tokens.last() == Some(&"PUBL") {
        tokens.pop();
    }

    let mut legal_form = None;
    if let Some((form, strip)) = detect_trailing_form(&tokens) {
        legal_form = Some(form);
        if strip > 0 && tokens.len() > strip {
            tokens.truncate(tokens.len() - strip);
        }
    }

    let normalized = if tokens.is_empty() {
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        tokens.join(" ")
    };

    NormalizedCompanyName {
        normalized,
        legal_form,
    }
}

/// Returns the detected trailing legal form and how many tokens to strip
fn detect_trailing_form(tokens: &[&str]) -> Option<(LegalForm, usize)> {
    let last = *tokens.last()?;
    let prev = tokens.len().checked_sub(2).map(|i| tokens[i]);

    match last {
        "AKTIEBOLAG" | "AKTIEBOLAGET" | "AB" => Some((LegalForm::Ab, 1)),
        "HANDELSBOLAG" | "HANDELSBOLAGET" | "HB" => Some((LegalForm::Hb, 1)),
        "KOMMANDITBOLAG" | "KOMMANDITBOLAGET" | "KB" => Some((LegalForm::Kb, 1)),
        "EF" => Some((LegalForm::Ef, 1)),
        "FIRMA" if prev == Some("ENSKILD") => Some((LegalForm::Ef, 2)),
        "FÖRENING" if prev == Some("EKONOMISK") => Some((LegalForm::EkFor, 2)),
        "FÖR" if prev == Some("EK") => Some((LegalForm::EkFor, 2)),
        "FÖRENING" if prev == Some("IDEELL") => Some((LegalForm::IdeellFor, 2)),
        "FÖR" if prev == Some("IDEELL") => Some((LegalForm::IdeellFor, 2)),
        // preserved in the name
        "STIFTELSE" | "STIFTELSEN" => Some((LegalForm::Stiftelse, 0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_aktiebolag_variants() {
        for input in ["Test Aktiebolag", "TEST AKTIEBOLAGET", "Test AB", "TEST AB."] {
            let n = normalize_company_name(input);
            assert_eq!(n.normalized, "TEST", "input {input}");
            assert_eq!(n.legal_form, Some(LegalForm::Ab));
        }
    }

    #[test]
    fn strips_status_indicators() {
        let n = normalize_company_name("Test AB i likvidation");
        assert_eq!(n.normalized, "TEST");
        let n = normalize_company_name("Nordic Invest Aktiebolag (publ)");
        assert_eq!(n.normalized, "NORDIC INVEST");
        assert_eq!(n.legal_form, Some(LegalForm::Ab));
    }

    #[test]
    fn two_token_forms() {
        let n = normalize_company_name("Svensson Enskild Firma");
        assert_eq!(n.normalized, "SVENSSON");
        assert_eq!(n.legal_form, Some(LegalForm::Ef));

        let n = normalize_company_name("Konsum Norr ekonomisk förening");
        assert_eq!(n.normalized, "KONSUM NORR");
        assert_eq!(n.legal_form, Some(LegalForm::EkFor));
    }

    #[test]
    fn stiftelse_is_detected_but_preserved() {
        let n = normalize_company_name("Allmänna Arvsfonden Stiftelse");
        assert_eq!(n.normalized, "ALLMÄNNA ARVSFONDEN STIFTELSE");
        assert_eq!(n.legal_form, Some(LegalForm::Stiftelse));
    }

    #[test]
    fn keeps_ampersand_drops_other_punctuation() {
        let n = normalize_company_name("Larsson & Söner, Bygg AB");
        assert_eq!(n.normalized, "LARSSON & SÖNER BYGG");
    }

    #[test]
    fn bare_legal_form_is_not_emptied() {
        let n = normalize_company_name("Aktiebolaget");
        assert_eq!(n.normalized, "AKTIEBOLAGET");
        assert_eq!(n.legal_form, Some(LegalForm::Ab));
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "Test Aktiebolag i likvidation",
            "Larsson & Söner, Bygg AB",
            "Konsum Norr ekonomisk förening",
        ] {
            let once = normalize_company_name(input);
            let twice = normalize_company_name(&once.normalized);
            assert_eq!(once.normalized, twice.normalized, "input {input}");
        }
    }
}
