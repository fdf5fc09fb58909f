//! Name and text canonicalization for lexical comparison.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Corporate suffixes and conjunctions that carry no identity.
pub const STOP_WORDS: &[&str] = &[
    "inc",
    "llc",
    "ltd",
    "corp",
    "co",
    "company",
    "group",
    "plc",
    "the",
    "and",
    "&",
    "corporation",
    "incorporated",
    "limited",
];

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());

/// Decompose, drop combining marks, lowercase, blank out everything that is
/// not an ASCII letter, digit or whitespace.
fn fold(text: &str) -> String {
    let stripped: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    NON_ALNUM
        .replace_all(&stripped.to_lowercase(), " ")
        .into_owned()
}

/// Canonical form of an entity name: folded tokens minus stop words, joined
/// by single spaces. Empty when nothing survives.
pub fn normalize_name(name: &str) -> String {
    tokenize(name).join(" ")
}

/// Tokens of the canonical name form.
pub fn tokenize(name: &str) -> Vec<String> {
    fold(name)
        .split_whitespace()
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Folded free text with whitespace collapsed. Keeps every word; used for
/// facts and risk statements where "the" or "and" are not noise in a phrase.
pub fn normalize_text(text: &str) -> String {
    fold(text).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First letter of each token.
pub fn initials<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .filter_map(|t| t.as_ref().chars().next())
        .collect()
}
