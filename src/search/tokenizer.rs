use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Runs of letters or digits in any script.
pub(crate) const WORD_PATTERN: &str = r"[\p{L}\p{N}]+";

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(WORD_PATTERN).expect("WORD_PATTERN is a valid regex"));

/// Tokens shorter than this are dropped.
const MIN_TOKEN_LEN: usize = 2;

/// Lowercase with diacritics stripped, so "Café" and "cafe" index identically.
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Splits text into unique tokens, keeping first-seen order.
pub fn tokenize_text(text: &str) -> Vec<String> {
    let folded = fold(text);
    let mut seen = HashSet::new();
    WORD.find_iter(&folded)
        .map(|m| m.as_str())
        .filter(|word| word.chars().count() >= MIN_TOKEN_LEN)
        .filter(|word| seen.insert(*word))
        .map(str::to_string)
        .collect()
}

/// Queries go through the same folding as documents.
pub fn tokenize_query(query: &str) -> Vec<String> {
    tokenize_text(query)
}

/// Builds the `searchKeywords` blob from the given fields. Style tags are
/// split on `_` so "neo_traditional" is findable as "traditional".
pub fn keywords<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let joined = fields
        .into_iter()
        .map(|field| field.replace('_', " "))
        .collect::<Vec<_>>()
        .join(" ");
    tokenize_text(&joined).join(" ")
}
