//! Phrase normalization used for matching.
//!
//! Normalized phrases are never stored; the alias table keeps the phrase
//! exactly as the user registered it.

use regex::Regex;
use std::sync::LazyLock;

static ARTICLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(the|a|an)\b").expect("valid article pattern"));

static FILLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(program|script|app)\b").expect("valid filler pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Normalize a phrase: lowercase, drop articles and the words
/// "program"/"script"/"app", collapse whitespace.
///
/// Words are removed only when they stand alone, so "another" and "apps"
/// survive. Removed words are replaced by a space, which keeps the function
/// idempotent.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let without_articles = ARTICLES.replace_all(&lowered, " ");
    let without_filler = FILLER.replace_all(&without_articles, " ");
    WHITESPACE
        .replace_all(&without_filler, " ")
        .trim()
        .to_string()
}

/// Unique whitespace-delimited tokens of an already-normalized phrase.
pub fn tokens(normalized: &str) -> std::collections::HashSet<&str> {
    normalized.split_whitespace().collect()
}
