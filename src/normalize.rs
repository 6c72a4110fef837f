//! Text canonicalization for dimension matching.
//!
//! Every comparison between raw free text and a dimension natural key goes
//! through [`normalize`]. Spellings that still differ after normalization
//! are remapped through the tables in [`crate::constants`], never here.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical comparison key: NFD, combining marks dropped, uppercase, trimmed.
///
/// Absent input stays absent. The function is idempotent.
pub fn normalize(text: Option<&str>) -> Option<String> {
    text.map(normalize_str)
}

/// [`normalize`] for a value known to be present.
pub fn normalize_str(text: &str) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped.to_uppercase().trim().to_string()
}

/// Lookup key for technology names and technology column headers.
///
/// `"Fibra Óptica"`, `"fibra_optica"` and `"FIBRAOPTICA"` all become
/// `"fibraoptica"`.
pub fn technology_key(raw: &str) -> String {
    normalize_str(raw)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lowercase ASCII alphanumerics only; used to compare speed bucket headers.
pub fn compact_key(raw: &str) -> String {
    normalize_str(raw)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Column header as written by the clean stage: trimmed, spaces and dashes
/// replaced with `_`, lowercase. Accents are kept.
pub fn snake_case_column(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Cleaned column name: [`snake_case_column`] followed by the identifier
/// alias table, so `"Año"` becomes `"anio"`.
pub fn canonical_column(raw: &str) -> String {
    let snake = snake_case_column(raw);
    crate::constants::COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == snake)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(snake)
}

/// Display form for province names in cleaned tables ("buenos aires" ->
/// "Buenos Aires").
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut at_word_start = true;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
