//! Markup-pattern extraction
//!
//! Structural probes over page markup, tried in order: the site-specific
//! page shape for known hosts, the active item of the episodes list, a
//! title heading, and any active or current episode link.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use super::page::episode_info_from_document;
use super::{dehyphenate, href_title, IdentityExtractor};
use crate::models::Identity;
use crate::sites::SiteProfile;

static EPISODE_LIST_ACTIVE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".block_area.block_area-episodes a.ep-item.active[data-number]")
        .expect("valid selector")
});
static TITLE_HEADING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "h1[class*=\"title\"], h1[class*=\"film-name\"], h2[class*=\"title\"], h2[class*=\"film-name\"]",
    )
    .expect("valid selector")
});
static ANY_ACTIVE_EPISODE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.ep-item.active[data-number], a.ep-item.current[data-number]")
        .expect("valid selector")
});

/// Extractor over page markup
#[derive(Debug, Default, Clone, Copy)]
pub struct DomExtractor;

impl IdentityExtractor for DomExtractor {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn extract(&self, url: &str, markup: Option<&str>) -> Identity {
        match markup {
            Some(markup) if !markup.trim().is_empty() => extract_from_dom(url, markup),
            _ => Identity::empty(),
        }
    }
}

/// Extract title and episode number from the markup of the page at `url`
pub fn extract_from_dom(url: &str, markup: &str) -> Identity {
    let document = Html::parse_document(markup);

    if matches!(
        SiteProfile::detect(url),
        SiteProfile::AniWatch | SiteProfile::AnimeSlayer
    ) {
        if let Some(info) = episode_info_from_document(&document, url) {
            let identity = Identity::new(Some(info.anime_title), info.episode_number);
            if identity.is_complete() {
                debug!("DOM extractor: site page shape matched");
                return identity;
            }
        }
    }

    let mut title = None;
    let mut number = None;

    if let Some(active) = document.select(&EPISODE_LIST_ACTIVE).next() {
        title = active.value().attr("href").and_then(href_title);
        number = active.value().attr("data-number").map(|n| n.trim().to_string());
    }
    let identity = Identity::new(title.clone(), number.clone());
    if identity.is_complete() {
        return identity;
    }

    if title.is_none() {
        title = document
            .select(&TITLE_HEADING)
            .map(|el| dehyphenate(&el.text().collect::<String>()))
            .find(|t| !t.is_empty());
    }
    let identity = Identity::new(title.clone(), number.clone());
    if identity.is_complete() {
        return identity;
    }

    if number.is_none() {
        number = document
            .select(&ANY_ACTIVE_EPISODE)
            .filter_map(|el| el.value().attr("data-number"))
            .map(|n| n.trim().to_string())
            .find(|n| !n.is_empty());
    }

    debug!("DOM extractor: title={:?} episode={:?}", title, number);
    Identity::new(title, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_markup_yields_empty_identity() {
        assert_eq!(DomExtractor.extract("https://x", None), Identity::empty());
        assert_eq!(DomExtractor.extract("https://x", Some("  ")), Identity::empty());
    }

    #[test]
    fn test_active_item_in_episode_list() {
        let html = r#"
            <div class="block_area block_area-episodes">
                <a class="ep-item active" href="/watch/demo-show?ep=7" data-number="7">7</a>
            </div>
        "#;
        let identity = extract_from_dom("https://site.example/watch/demo-show", html);
        assert_eq!(identity.anime_title.as_deref(), Some("demo show"));
        assert_eq!(identity.episode_number.as_deref(), Some("7"));
    }

    #[test]
    fn test_heading_and_current_link() {
        let html = r#"
            <h1 class="anime-title">Spy-x-Family</h1>
            <ul><li><a class="ep-item current" href="/e/3" data-number="3">3</a></li></ul>
        "#;
        let identity = extract_from_dom("https://site.example/page", html);
        assert_eq!(identity.anime_title.as_deref(), Some("Spy x Family"));
        assert_eq!(identity.episode_number.as_deref(), Some("3"));
    }

    #[test]
    fn test_heading_only() {
        let html = r#"<h2 class="film-name dynamic-name">Dandadan</h2>"#;
        let identity = extract_from_dom("https://site.example/page", html);
        assert_eq!(identity.anime_title.as_deref(), Some("Dandadan"));
        assert_eq!(identity.episode_number, None);
    }

    #[test]
    fn test_site_branch_runs_first_for_aniwatch() {
        let html = r#"
            <h1 class="film-name">Ignored Heading</h1>
            <div class="block_area block_area-episodes">
                <a class="ep-item active" href="/watch/frieren-18542?ep=5" data-number="12" title="t">12</a>
            </div>
        "#;
        let identity = extract_from_dom("https://aniwatchtv.to/watch/frieren-18542?ep=5", html);
        assert_eq!(identity.anime_title.as_deref(), Some("frieren 18542"));
        assert_eq!(identity.episode_number.as_deref(), Some("12"));
    }

    #[test]
    fn test_unrelated_markup() {
        let html = "<html><body><p>nothing here</p></body></html>";
        assert_eq!(extract_from_dom("https://site.example/x", html), Identity::empty());
    }
}
