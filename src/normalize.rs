//! Title normalization
//!
//! Maps the many spellings a site or extractor produces for the same series
//! ("Demo Show", "demo-show-episode-5", "demo show 5-حلقة") onto one storage
//! key, and provides the looser comparison form used when matching stored
//! keys against lookups.

use regex::Regex;
use std::sync::LazyLock;

/// Trailing episode marker in either supported convention, with any mix of
/// hyphens and spaces as separators.
static EPISODE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[\s-]+episode[\s-]+\d+|[\s-]*\d+[\s-]+حلقة|[\s-]+حلقة[\s-]+\d+)\s*$")
        .expect("episode suffix pattern is valid")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Remove trailing episode markers until none is left.
pub fn strip_episode_suffix(title: &str) -> String {
    let mut current = title.trim().to_string();
    loop {
        let stripped = EPISODE_SUFFIX.replace(&current, "").trim().to_string();
        if stripped == current {
            return current;
        }
        current = stripped;
    }
}

/// Canonical series key for a raw title.
///
/// Case is preserved; whitespace runs become a single hyphen.
pub fn normalize(raw_title: &str) -> String {
    let stripped = strip_episode_suffix(raw_title);
    WHITESPACE.replace_all(stripped.trim(), "-").into_owned()
}

/// Lower-case, space separated, punctuation-free form used for matching.
pub fn normalize_for_comparison(key: &str) -> String {
    let cleaned: String = key
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '"' | ',' | '.' | '\u{201C}' | '\u{201D}' | ':'))
        .map(|c| if c == '-' { ' ' } else { c })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a stored key and a lookup title denote the same series.
///
/// Equal comparison forms match, and so does containment in either
/// direction. Containment lets `my-hero-academia` answer a lookup for
/// `my hero academia season 2`, but it also lets a short key such as `k`
/// swallow unrelated titles.
// TODO: revisit containment once lookups carry a source site; short keys
// currently match too eagerly.
pub fn keys_match(stored: &str, lookup: &str) -> bool {
    let stored = normalize_for_comparison(stored);
    let lookup = normalize_for_comparison(lookup);

    if stored.is_empty() || lookup.is_empty() {
        return false;
    }

    stored == lookup || stored.contains(&lookup) || lookup.contains(&stored)
}
