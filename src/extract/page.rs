//! Page-side episode info
//!
//! The answer to `getEpisodeInfo`: what an open episode page says about
//! itself. Two page shapes are understood, the episode list with an active
//! item (AniWatch-style) and the Arabic `.block-post` card.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

use super::href_title;
use crate::models::PageEpisodeInfo;

static ACTIVE_EPISODE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".block_area.block_area-episodes .ep-item.active").expect("valid selector")
});
static BLOCK_POST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".block-post").expect("valid selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static EPISODE_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".episode").expect("valid selector"));

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid pattern"));
static ARABIC_EPISODE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"حلقة \d+").expect("valid pattern"));

/// Read episode info from the markup of the page at `page_url`
pub fn episode_info(page_url: &str, markup: &str) -> Option<PageEpisodeInfo> {
    let document = Html::parse_document(markup);
    episode_info_from_document(&document, page_url)
}

pub(crate) fn episode_info_from_document(
    document: &Html,
    page_url: &str,
) -> Option<PageEpisodeInfo> {
    if let Some(active) = document.select(&ACTIVE_EPISODE).next() {
        let element = active.value();
        if let Some(anime_title) = element.attr("href").and_then(href_title) {
            return Some(PageEpisodeInfo {
                anime_title,
                episode_number: element
                    .attr("data-number")
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                episode_title: element.attr("title").map(|t| t.trim().to_string()),
                url: page_url.to_string(),
            });
        }
    }

    let block_post = document.select(&BLOCK_POST).next()?;
    let link = block_post.select(&LINK).next()?;
    let title = link.value().attr("title")?.trim().to_string();
    let anime_title = ARABIC_EPISODE_LABEL.replace(&title, "").trim().to_string();
    if anime_title.is_empty() {
        return None;
    }

    let episode_number = block_post
        .select(&EPISODE_LABEL)
        .next()
        .map(|el| el.text().collect::<String>())
        .and_then(|text| DIGITS.find(&text).map(|m| m.as_str().to_string()));

    Some(PageEpisodeInfo {
        anime_title,
        episode_number,
        episode_title: Some(title),
        url: link
            .value()
            .attr("href")
            .map(|h| h.to_string())
            .unwrap_or_else(|| page_url.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_info_empty_html() {
        assert_eq!(episode_info("https://x", "<html><body></body></html>"), None);
    }

    #[test]
    fn test_episode_info_active_list_item() {
        let html = r#"
        <html><body>
            <div class="block_area block_area-episodes">
                <a class="ep-item" href="/watch/frieren-18542?ep=1" data-number="1" title="The Journey's End">1</a>
                <a class="ep-item active" href="/watch/frieren-18542?ep=2" data-number="2" title="It Didn't Have to Be Magic">2</a>
            </div>
        </body></html>
        "#;

        let info = episode_info("https://aniwatchtv.to/watch/frieren-18542?ep=2", html).unwrap();
        assert_eq!(info.anime_title, "frieren 18542");
        assert_eq!(info.episode_number.as_deref(), Some("2"));
        assert_eq!(info.episode_title.as_deref(), Some("It Didn't Have to Be Magic"));
        assert_eq!(info.url, "https://aniwatchtv.to/watch/frieren-18542?ep=2");
    }

    #[test]
    fn test_episode_info_block_post() {
        let html = r#"
        <html><body>
            <div class="block-post">
                <a href="https://animeslayer.art/naruto-حلقة-9" title="ناروتو حلقة 9">
                    <span class="episode">الحلقة 9</span>
                </a>
            </div>
        </body></html>
        "#;

        let info = episode_info("https://animeslayer.art/x", html).unwrap();
        assert_eq!(info.anime_title, "ناروتو");
        assert_eq!(info.episode_number.as_deref(), Some("9"));
        assert_eq!(info.url, "https://animeslayer.art/naruto-حلقة-9");
    }

    #[test]
    fn test_episode_info_block_post_without_title() {
        let html = r#"<div class="block-post"><a href="/x">x</a></div>"#;
        assert_eq!(episode_info("https://animeslayer.art/x", html), None);
    }
}
