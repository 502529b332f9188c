//! Phonetic blocking codes

use rphonetic::{DoubleMetaphone, Encoder};

/// Transliterate Swedish letters before phonetic encoding
fn transliterate(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'Å' | 'Ä' | 'å' | 'ä' => 'A',
            'Ö' | 'ö' => 'O',
            'É' | 'é' | 'È' | 'è' => 'E',
            'Ü' | 'ü' => 'U',
            other => other,
        })
        .collect()
}

/// Phonetic code for name blocking
///
/// Double Metaphone primary, falling back to the alternate encoding, falling
/// back to the first four uppercased characters.
pub fn phonetic_code(name: &str) -> String {
    let ascii = transliterate(name);
    let encoder = DoubleMetaphone::default();

    let primary = encoder.encode(&ascii);
    if !primary.is_empty() {
        return primary;
    }
    let alternate = encoder.encode_alternate(&ascii);
    if !alternate.is_empty() {
        return alternate;
    }

    ascii
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect()
}
