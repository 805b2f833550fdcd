//! Tokenization shared by search and topic extraction

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Runs of letters or digits; everything else separates tokens
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid regex"));

/// Split text into case-folded tokens, in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Distinct case-folded tokens of `text`
pub fn token_set(text: &str) -> HashSet<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
