//! Episode identity extraction
//!
//! Independent, best-effort strategies that derive an anime title and an
//! episode number from a page URL and (optionally) its markup, plus the
//! chain that reconciles them. Extractors never fail: anything they cannot
//! read is reported as a missing field.

pub mod chain;
pub mod custom;
pub mod dom;
pub mod image;
pub mod page;
pub mod url_pattern;

pub use chain::{resolve_identity, ExtractorChain};
pub use custom::SiteOverrideExtractor;
pub use dom::DomExtractor;
pub use image::extract_cover_image;
pub use page::episode_info;
pub use url_pattern::UrlExtractor;

use crate::models::Identity;

/// A strategy that reads an [`Identity`] from a URL and optional markup
pub trait IdentityExtractor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Best-effort extraction; missing data is reported as `None` fields
    fn extract(&self, url: &str, markup: Option<&str>) -> Identity;
}

/// Replace hyphens with spaces, collapse whitespace and trim
pub(crate) fn dehyphenate(text: &str) -> String {
    text.replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last path segment of an href, without its query string
pub(crate) fn href_title(href: &str) -> Option<String> {
    let last = href.split('?').next()?.trim_end_matches('/').rsplit('/').next()?;
    let title = dehyphenate(last);
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dehyphenate() {
        assert_eq!(dehyphenate("demo-show"), "demo show");
        assert_eq!(dehyphenate(" a--b  c "), "a b c");
    }

    #[test]
    fn test_href_title() {
        assert_eq!(
            href_title("/watch/frieren-beyond-journeys-end-18542?ep=107257").as_deref(),
            Some("frieren beyond journeys end 18542")
        );
        assert_eq!(href_title("https://x/anime/one-piece/").as_deref(), Some("one piece"));
        assert_eq!(href_title("?ep=1"), None);
    }
}
