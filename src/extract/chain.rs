//! Extractor chain
//!
//! Runs the extractors in priority order (URL, markup, site override) and
//! reconciles their answers into one identity.

use tracing::debug;

use super::{DomExtractor, IdentityExtractor, SiteOverrideExtractor, UrlExtractor};
use crate::models::Identity;
use crate::normalize::strip_episode_suffix;

/// Ordered set of extractors
pub struct ExtractorChain {
    extractors: Vec<Box<dyn IdentityExtractor>>,
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(UrlExtractor),
            Box::new(DomExtractor),
            Box::new(SiteOverrideExtractor),
        ])
    }
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Box<dyn IdentityExtractor>>) -> Self {
        Self { extractors }
    }

    /// First complete identity in priority order; otherwise the union of
    /// all partial answers, earlier extractors winning on conflict.
    pub fn resolve(&self, url: &str, markup: Option<&str>) -> Identity {
        let mut merged = Identity::empty();

        for extractor in &self.extractors {
            let identity = extractor.extract(url, markup);
            debug!("{} extractor result: {:?}", extractor.name(), identity);

            if identity.is_complete() {
                return clean(identity);
            }
            merged = merged.fill_from(&identity);
        }

        clean(merged)
    }
}

/// Resolve with the default chain
pub fn resolve_identity(url: &str, markup: Option<&str>) -> Identity {
    ExtractorChain::default().resolve(url, markup)
}

/// Titles sourced from URLs that repeat the episode marker keep it after
/// extraction; it is stripped here so the key never carries it.
fn clean(identity: Identity) -> Identity {
    let title = identity.anime_title.map(|t| strip_episode_suffix(&t));
    Identity::new(title, identity.episode_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Identity);

    impl IdentityExtractor for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extract(&self, _url: &str, _markup: Option<&str>) -> Identity {
            self.1.clone()
        }
    }

    fn id(title: Option<&str>, number: Option<&str>) -> Identity {
        Identity::new(title.map(String::from), number.map(String::from))
    }

    #[test]
    fn test_url_only_resolution() {
        let identity = resolve_identity("https://site.example/anime/demo-show-episode-5", None);
        assert_eq!(identity, id(Some("demo show"), Some("5")));
    }

    #[test]
    fn test_first_complete_result_wins() {
        let chain = ExtractorChain::new(vec![
            Box::new(Fixed("a", id(Some("only title"), None))),
            Box::new(Fixed("b", id(Some("full"), Some("2")))),
            Box::new(Fixed("c", id(Some("never"), Some("9")))),
        ]);
        assert_eq!(chain.resolve("u", None), id(Some("full"), Some("2")));
    }

    #[test]
    fn test_union_fill_earlier_wins() {
        let chain = ExtractorChain::new(vec![
            Box::new(Fixed("url", id(Some("from url"), None))),
            Box::new(Fixed("dom", id(None, None))),
            Box::new(Fixed("override", id(Some("from override"), Some("4")))),
        ]);
        // The override is complete on its own and wins outright
        assert_eq!(chain.resolve("u", None), id(Some("from override"), Some("4")));

        let chain = ExtractorChain::new(vec![
            Box::new(Fixed("url", id(Some("from url"), None))),
            Box::new(Fixed("dom", id(Some("from dom"), None))),
            Box::new(Fixed("override", id(None, Some("4")))),
        ]);
        assert_eq!(chain.resolve("u", None), id(Some("from url"), Some("4")));
    }

    #[test]
    fn test_complete_markup_answer_beats_partial_url() {
        let markup = r#"
            <div class="block_area block_area-episodes">
                <a class="ep-item active" href="/watch/frieren-18542?ep=9" data-number="9">9</a>
            </div>
        "#;
        let identity = resolve_identity(
            "https://aniwatchtv.to/watch/frieren-18542?ep=9",
            Some(markup),
        );
        assert_eq!(identity, id(Some("frieren 18542"), Some("9")));

        // Without markup only the URL title is known
        let identity = resolve_identity("https://aniwatchtv.to/watch/frieren-18542?ep=9", None);
        assert_eq!(identity, id(Some("frieren"), None));
    }

    #[test]
    fn test_duplicated_marker_is_stripped() {
        let chain = ExtractorChain::new(vec![Box::new(Fixed(
            "url",
            id(Some("demo-show-episode-5"), Some("5")),
        ))]);
        assert_eq!(chain.resolve("u", None), id(Some("demo-show"), Some("5")));
    }

    #[test]
    fn test_nothing_resolves() {
        assert_eq!(resolve_identity("not a url", None), Identity::empty());
    }
}
