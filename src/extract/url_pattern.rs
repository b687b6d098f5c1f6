//! URL-pattern extraction
//!
//! Reads `<title>-episode-<n>` or `<title>-حلقة-<n>` from the decoded URL
//! path. AniWatch-family URLs carry only the title (followed by a numeric
//! id) and never the episode number.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use super::{dehyphenate, IdentityExtractor};
use crate::models::Identity;
use crate::sites::SiteProfile;

static EPISODE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(.+?)-(episode|حلقة)-(\d+)").expect("valid pattern"));
static EPISODE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:episode|حلقة)-(\d+)").expect("valid pattern"));
static EPISODE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-(?:episode|حلقة)-\d+").expect("valid pattern"));
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+$").expect("valid pattern"));
static ARABIC_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{0600}-\u{06FF}]").expect("valid pattern"));

/// Extractor over the URL path
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlExtractor;

impl IdentityExtractor for UrlExtractor {
    fn name(&self) -> &'static str {
        "url"
    }

    fn extract(&self, url: &str, _markup: Option<&str>) -> Identity {
        extract_from_url(url)
    }
}

/// Extract title and episode number from a page URL
pub fn extract_from_url(url: &str) -> Identity {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Malformed URL {:?}: {}", url, e);
            return Identity::empty();
        }
    };

    let decoded_path = urlencoding::decode(parsed.path())
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| parsed.path().to_string());
    let segments: Vec<&str> = decoded_path.split('/').filter(|s| !s.is_empty()).collect();

    if SiteProfile::from_url(&parsed) == SiteProfile::AniWatch {
        if let Some(identity) = extract_watch_title(&segments) {
            return identity;
        }
    }

    let Some(&last) = segments.last() else {
        return Identity::empty();
    };

    let (title, episode_number) = if let Some(caps) = EPISODE_SEGMENT.captures(last) {
        (caps[1].to_string(), Some(caps[3].to_string()))
    } else if let Some(idx) = segments.iter().position(|s| *s == "episode") {
        let full_path = segments[idx + 1..].join("-");
        let title = EPISODE_SEGMENT
            .captures(&full_path)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| full_path.clone());
        let number = EPISODE_NUMBER
            .captures(&full_path)
            .map(|caps| caps[1].to_string());
        (title, number)
    } else {
        let title = EPISODE_SPLIT
            .split(last)
            .next()
            .filter(|t| !t.is_empty())
            .unwrap_or(last)
            .to_string();
        let number = EPISODE_NUMBER.captures(last).map(|caps| caps[1].to_string());
        (title, number)
    };

    let title = dehyphenate(&ARABIC_SCRIPT.replace_all(&title, ""));
    debug!("URL extractor: title={:?} episode={:?}", title, episode_number);

    Identity::new(Some(title), episode_number)
}

/// `/watch/<title>-<id>`: title only, the episode number lives in markup
fn extract_watch_title(segments: &[&str]) -> Option<Identity> {
    let idx = segments.iter().position(|s| *s == "watch")?;
    let segment = *segments.get(idx + 1)?;
    let segment = segment.split('?').next().unwrap_or(segment);
    let title = dehyphenate(&TRAILING_ID.replace(segment, ""));
    debug!("Watch URL title: {:?}, episode deferred to markup", title);

    Some(Identity::new(Some(title), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_episode_url() {
        let identity = extract_from_url("https://site.example/anime/demo-show-episode-5");
        assert_eq!(identity.anime_title.as_deref(), Some("demo show"));
        assert_eq!(identity.episode_number.as_deref(), Some("5"));
    }

    #[test]
    fn test_trailing_slash_and_case() {
        let identity = extract_from_url("https://gogoanime.by/One-Piece-Episode-1071/");
        assert_eq!(identity.anime_title.as_deref(), Some("One Piece"));
        assert_eq!(identity.episode_number.as_deref(), Some("1071"));
    }

    #[test]
    fn test_arabic_episode_url_percent_encoded() {
        let identity = extract_from_url(
            "https://animeslayer.art/anime/naruto-%D8%AD%D9%84%D9%82%D8%A9-12",
        );
        assert_eq!(identity.anime_title.as_deref(), Some("naruto"));
        assert_eq!(identity.episode_number.as_deref(), Some("12"));
    }

    #[test]
    fn test_residual_arabic_is_removed_from_title() {
        let identity = extract_from_url("https://animeslayer.art/انمي-bleach-episode-3");
        assert_eq!(identity.anime_title.as_deref(), Some("bleach"));
        assert_eq!(identity.episode_number.as_deref(), Some("3"));
    }

    #[test]
    fn test_aniwatch_url_has_no_episode_number() {
        let identity =
            extract_from_url("https://aniwatchtv.to/watch/im-a-noble-on-the-brink-of-ruin-19458?ep=131000");
        assert_eq!(
            identity.anime_title.as_deref(),
            Some("im a noble on the brink of ruin")
        );
        assert_eq!(identity.episode_number, None);
    }

    #[test]
    fn test_episode_path_segment_fallback() {
        let identity = extract_from_url("https://site.example/episode/demo-show/episode-4");
        assert_eq!(identity.episode_number.as_deref(), Some("4"));
        assert!(identity.anime_title.is_some());
    }

    #[test]
    fn test_url_without_episode_marker() {
        let identity = extract_from_url("https://site.example/anime/demo-show");
        assert_eq!(identity.anime_title.as_deref(), Some("demo show"));
        assert_eq!(identity.episode_number, None);
    }

    #[test]
    fn test_malformed_and_empty_urls() {
        assert_eq!(extract_from_url("not a url"), Identity::empty());
        assert_eq!(extract_from_url("https://site.example/"), Identity::empty());
    }
}
