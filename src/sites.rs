//! Known streaming site profiles
//!
//! Every host-dependent decision (URL shape, markup probes, cover art,
//! probing support, next-episode URL) is answered by a [`SiteProfile`].
//! Unknown hosts fall through to [`SiteProfile::Generic`].

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Percent-encoded form of the Arabic word for "episode" (lower-case hex)
const ENCODED_ARABIC_EPISODE: &str = "%d8%ad%d9%84%d9%82%d8%a9";

static ENCODED_ARABIC_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){}-\d+", ENCODED_ARABIC_EPISODE)).expect("valid pattern")
});
static ARABIC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"حلقة-\d+").expect("valid pattern"));
static LATIN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)episode-\d+").expect("valid pattern"));

/// A streaming site the tracker knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteProfile {
    /// aniwatchtv.to and 9animetv.to: `/watch/<title>-<id>?ep=<id>`, episode
    /// numbers only in markup, next-episode URLs not derivable
    AniWatch,
    /// gogoanime.by: `/<title>-episode-<n>/`
    GogoAnime,
    /// animeslayer.art: Arabic episode marker in URLs and markup
    AnimeSlayer,
    /// Site read through its own regex table
    CustomSelectors,
    /// Any other host
    Generic,
}

impl SiteProfile {
    /// Profile for a host name
    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host.contains("aniwatchtv.to") || host.contains("9animetv.to") {
            SiteProfile::AniWatch
        } else if host.contains("gogoanime.by") {
            SiteProfile::GogoAnime
        } else if host.contains("animeslayer.art") {
            SiteProfile::AnimeSlayer
        } else if host.contains("specific-anime-site.com") {
            SiteProfile::CustomSelectors
        } else {
            SiteProfile::Generic
        }
    }

    /// Profile for a parsed URL
    pub fn from_url(url: &Url) -> Self {
        url.host_str().map(Self::from_host).unwrap_or(SiteProfile::Generic)
    }

    /// Profile for a raw URL string; unparseable input is [`SiteProfile::Generic`]
    pub fn detect(url: &str) -> Self {
        Url::parse(url)
            .map(|u| Self::from_url(&u))
            .unwrap_or(SiteProfile::Generic)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            SiteProfile::AniWatch => "aniwatch",
            SiteProfile::GogoAnime => "gogoanime",
            SiteProfile::AnimeSlayer => "animeslayer",
            SiteProfile::CustomSelectors => "custom",
            SiteProfile::Generic => "generic",
        }
    }

    /// Whether a network probe can tell if an episode exists.
    ///
    /// For profiles that return `false`, a negative probe result means
    /// "unknown" and `isLastEpisode` is authoritative instead.
    pub fn supports_probing(&self) -> bool {
        !matches!(self, SiteProfile::AniWatch)
    }

    /// CSS selectors locating the cover image for this profile
    pub fn cover_selectors(&self) -> &'static [&'static str] {
        match self {
            SiteProfile::GogoAnime => &["div.thumb > img[src]"],
            SiteProfile::AniWatch => &["div.film-poster > img.film-poster-img[src]"],
            SiteProfile::AnimeSlayer => &["div.thumb > a > img[src]"],
            SiteProfile::CustomSelectors | SiteProfile::Generic => &[],
        }
    }

    /// URL of episode `episode_number` of the series `current_url` belongs to.
    ///
    /// Returns `None` when the URL carries no episode marker to rewrite.
    pub fn episode_url(&self, current_url: &str, episode_number: u64) -> Option<String> {
        if *self == SiteProfile::AniWatch {
            let base = current_url.split('?').next().unwrap_or(current_url);
            return Some(format!("{}?ep=next&epnum={}", base, episode_number));
        }

        if ENCODED_ARABIC_MARKER.is_match(current_url) {
            let replacement = format!("{}-{}", ENCODED_ARABIC_EPISODE, episode_number);
            return Some(
                ENCODED_ARABIC_MARKER
                    .replace(current_url, replacement.as_str())
                    .into_owned(),
            );
        }

        if ARABIC_MARKER.is_match(current_url) {
            let replacement = format!("حلقة-{}", episode_number);
            return Some(ARABIC_MARKER.replace(current_url, replacement.as_str()).into_owned());
        }

        if LATIN_MARKER.is_match(current_url) {
            let replacement = format!("episode-{}", episode_number);
            return Some(LATIN_MARKER.replace(current_url, replacement.as_str()).into_owned());
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_detection() {
        assert_eq!(
            SiteProfile::detect("https://aniwatchtv.to/watch/frieren-18542?ep=107257"),
            SiteProfile::AniWatch
        );
        assert_eq!(SiteProfile::detect("https://9animetv.to/watch/x-1"), SiteProfile::AniWatch);
        assert_eq!(
            SiteProfile::detect("https://gogoanime.by/naruto-episode-3/"),
            SiteProfile::GogoAnime
        );
        assert_eq!(
            SiteProfile::detect("https://www.animeslayer.art/x"),
            SiteProfile::AnimeSlayer
        );
        assert_eq!(SiteProfile::detect("not a url"), SiteProfile::Generic);
        assert_eq!(
            SiteProfile::detect("https://site.example/anime/demo-show-episode-5"),
            SiteProfile::Generic
        );
    }

    #[test]
    fn test_only_aniwatch_skips_probing() {
        assert!(!SiteProfile::AniWatch.supports_probing());
        assert!(SiteProfile::GogoAnime.supports_probing());
        assert!(SiteProfile::Generic.supports_probing());
    }

    #[test]
    fn test_episode_url_latin() {
        let url = SiteProfile::Generic.episode_url("https://site.example/anime/demo-show-episode-5", 6);
        assert_eq!(url.as_deref(), Some("https://site.example/anime/demo-show-episode-6"));
    }

    #[test]
    fn test_episode_url_arabic_raw_and_encoded() {
        let raw = SiteProfile::AnimeSlayer.episode_url("https://animeslayer.art/naruto-حلقة-7", 8);
        assert_eq!(raw.as_deref(), Some("https://animeslayer.art/naruto-حلقة-8"));

        let encoded = SiteProfile::AnimeSlayer
            .episode_url("https://animeslayer.art/naruto-%D8%AD%D9%84%D9%82%D8%A9-7", 8);
        assert_eq!(
            encoded.as_deref(),
            Some("https://animeslayer.art/naruto-%d8%ad%d9%84%d9%82%d8%a9-8")
        );
    }

    #[test]
    fn test_episode_url_aniwatch() {
        let url = SiteProfile::AniWatch.episode_url("https://aniwatchtv.to/watch/frieren-18542?ep=107257", 3);
        assert_eq!(
            url.as_deref(),
            Some("https://aniwatchtv.to/watch/frieren-18542?ep=next&epnum=3")
        );
    }

    #[test]
    fn test_episode_url_without_marker() {
        assert_eq!(SiteProfile::Generic.episode_url("https://site.example/watch/abc", 2), None);
    }
}
