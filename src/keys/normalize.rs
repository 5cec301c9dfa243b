//! Attribute normalisation for key material.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical tattoo style vocabulary.
pub const STYLE_VOCABULARY: [&str; 22] = [
    "old_school",
    "traditional",
    "new_school",
    "neo_traditional",
    "tribal",
    "blackwork",
    "dotwork",
    "geometric",
    "japanese",
    "lettering",
    "biomechanical",
    "watercolour",
    "floral",
    "fineline",
    "realism",
    "minimalist",
    "surrealism",
    "portrait",
    "sketch",
    "illustrative",
    "ornamental",
    "trash_polka",
];

const STYLE_ALIASES: [(&str, &str); 6] = [
    ("watercolor", "watercolour"),
    ("fine_line", "fineline"),
    ("black_work", "blackwork"),
    ("dot_work", "dotwork"),
    ("neotraditional", "neo_traditional"),
    ("realistic", "realism"),
];

/// Lowercases a style tag and joins its words with `_`, then folds known aliases
/// onto the vocabulary spelling. Unknown styles are returned in that form too.
pub fn normalize_style(raw: &str) -> String {
    let joined = raw
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    STYLE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == joined)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(joined)
}

pub fn is_known_style(style: &str) -> bool {
    STYLE_VOCABULARY.contains(&style)
}

/// Folds a display name into the `NAME#` key form: diacritics stripped,
/// lowercase, every run of non-alphanumerics collapsed to a single `-`.
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    let mut out = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Reduces a handle or profile URL to the bare lowercase handle.
pub fn normalize_handle(raw: &str) -> String {
    let without_query = raw.trim().split(['?', '#']).next().unwrap_or_default();
    let trimmed = without_query.trim_end_matches('/');
    let last_segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last_segment
        .trim_start_matches('@')
        .trim()
        .to_lowercase()
}

pub fn normalize_location(raw: &str) -> String {
    raw.trim().to_lowercase()
}
