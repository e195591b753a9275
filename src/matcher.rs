//! Tiered phrase resolution against the alias table.
//!
//! Tiers are evaluated in order and the first one that yields a candidate
//! wins:
//!
//! | Tier | Rule                                                            |
//! |------|-----------------------------------------------------------------|
//! | 1    | normalized phrase equals a normalized registered phrase         |
//! | 2    | highest token overlap, ties broken by shorter normalized phrase |
//! | 3    | first phrase (insertion order) that is a substring either way   |
//!
//! A miss is `None`, never an error.

use crate::alias::AliasTable;
use crate::normalize::{normalize, tokens};
use tracing::debug;

/// A registered phrase selected by the matcher, with its script path.
///
/// The path was validated when the phrase was registered; it is not checked
/// again here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub matched_phrase: String,
    pub path: String,
}

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    TokenOverlap,
    Substring,
}

/// Resolve a raw phrase to the best registered entry.
pub fn resolve(table: &AliasTable, raw_phrase: &str) -> Option<ResolvedTarget> {
    resolve_with_tier(table, raw_phrase).map(|(target, _)| target)
}

/// Like [`resolve`], also reporting the tier that matched.
pub fn resolve_with_tier(
    table: &AliasTable,
    raw_phrase: &str,
) -> Option<(ResolvedTarget, MatchTier)> {
    if table.is_empty() {
        return None;
    }

    let wanted = normalize(raw_phrase);
    let normalized: Vec<(&str, &str, String)> = table
        .iter()
        .map(|e| (e.phrase.as_str(), e.path.as_str(), normalize(&e.phrase)))
        .collect();

    let found = exact(&normalized, raw_phrase, &wanted)
        .map(|hit| (hit, MatchTier::Exact))
        .or_else(|| token_overlap(&normalized, &wanted).map(|hit| (hit, MatchTier::TokenOverlap)))
        .or_else(|| substring(&normalized, &wanted).map(|hit| (hit, MatchTier::Substring)));

    let ((phrase, path), tier) = found?;
    debug!(raw = raw_phrase, matched = phrase, ?tier, "phrase resolved");
    Some((
        ResolvedTarget {
            matched_phrase: phrase.to_string(),
            path: path.to_string(),
        },
        tier,
    ))
}

type Candidate<'a> = (&'a str, &'a str);

// Several raw phrases may share one normalized form. The verbatim phrase wins
// if registered; otherwise the most recently registered one does.
fn exact<'a>(
    normalized: &[(&'a str, &'a str, String)],
    raw_phrase: &str,
    wanted: &str,
) -> Option<Candidate<'a>> {
    let mut hit = None;
    for (phrase, path, norm) in normalized {
        if norm != wanted {
            continue;
        }
        if *phrase == raw_phrase {
            return Some((*phrase, *path));
        }
        hit = Some((*phrase, *path));
    }
    hit
}

fn token_overlap<'a>(
    normalized: &[(&'a str, &'a str, String)],
    wanted: &str,
) -> Option<Candidate<'a>> {
    let wanted_tokens = tokens(wanted);
    let mut best: Option<(usize, usize, Candidate<'a>)> = None;

    for (phrase, path, norm) in normalized {
        let overlap = tokens(norm).intersection(&wanted_tokens).count();
        if overlap == 0 {
            continue;
        }
        let len = norm.chars().count();
        // Strict comparison: on a full tie the earlier entry stays.
        let better = match best {
            None => true,
            Some((best_overlap, best_len, _)) => {
                overlap > best_overlap || (overlap == best_overlap && len < best_len)
            }
        };
        if better {
            best = Some((overlap, len, (*phrase, *path)));
        }
    }

    best.map(|(_, _, candidate)| candidate)
}

// Unscored: the first structural match in insertion order wins.
fn substring<'a>(
    normalized: &[(&'a str, &'a str, String)],
    wanted: &str,
) -> Option<Candidate<'a>> {
    normalized
        .iter()
        .find(|(_, _, norm)| wanted.contains(norm.as_str()) || norm.contains(wanted))
        .map(|(phrase, path, _)| (*phrase, *path))
}
