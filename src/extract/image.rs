//! Cover image extraction

use scraper::{Html, Selector};
use tracing::debug;

use crate::constants::default_cover_url;
use crate::sites::SiteProfile;

/// Cover art URL for a series page, falling back to the default cover
/// location when no site probe matches.
pub fn extract_cover_image(url: &str, markup: Option<&str>, series: &str) -> String {
    let fallback = default_cover_url(series);
    let Some(markup) = markup.filter(|m| !m.trim().is_empty()) else {
        return fallback;
    };

    let profile = SiteProfile::detect(url);
    let document = Html::parse_document(markup);

    for selector in profile.cover_selectors() {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        if let Some(src) = document
            .select(&selector)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty())
        {
            debug!("Cover image from {}: {}", profile.name(), src);
            return src.to_string();
        }
    }

    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_without_markup() {
        assert_eq!(
            extract_cover_image("https://gogoanime.by/x-episode-1", None, "naruto"),
            "https://gogocdn.net/cover/naruto.png"
        );
    }

    #[test]
    fn test_gogoanime_thumb() {
        let html = r#"<div class="thumb"><img src="https://cdn.example/naruto.jpg"></div>"#;
        assert_eq!(
            extract_cover_image("https://gogoanime.by/naruto-episode-1", Some(html), "naruto"),
            "https://cdn.example/naruto.jpg"
        );
    }

    #[test]
    fn test_aniwatch_poster() {
        let html = r#"<div class="film-poster"><img src="https://img.example/p.jpg" class="film-poster-img"></div>"#;
        assert_eq!(
            extract_cover_image("https://aniwatchtv.to/watch/x-1", Some(html), "x"),
            "https://img.example/p.jpg"
        );
    }

    #[test]
    fn test_animeslayer_thumb_link() {
        let html = r#"<div class="thumb"><a href="/a"><img src="https://s.example/c.png" alt="c"></a></div>"#;
        assert_eq!(
            extract_cover_image("https://animeslayer.art/x", Some(html), "x"),
            "https://s.example/c.png"
        );
    }

    #[test]
    fn test_generic_site_uses_fallback() {
        let html = r#"<div class="thumb"><img src="https://cdn.example/n.jpg"></div>"#;
        assert_eq!(
            extract_cover_image("https://site.example/demo-show-episode-5", Some(html), "demo-show"),
            "https://gogocdn.net/cover/demo-show.png"
        );
    }
}
