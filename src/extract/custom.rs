//! Site-specific override extraction
//!
//! A host-keyed table of regex probes for sites whose markup or URLs fit
//! none of the generic patterns. Unknown hosts yield an empty identity.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use super::IdentityExtractor;
use crate::models::Identity;
use crate::sites::SiteProfile;

static CUSTOM_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="specific-title-selector"[^>]*>(.*?)</div>"#)
        .expect("valid pattern")
});
static CUSTOM_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="specific-episode-selector"[^>]*>.*?(\d+)"#)
        .expect("valid pattern")
});

/// Extractor over the per-host override table
#[derive(Debug, Default, Clone, Copy)]
pub struct SiteOverrideExtractor;

impl IdentityExtractor for SiteOverrideExtractor {
    fn name(&self) -> &'static str {
        "site-override"
    }

    fn extract(&self, url: &str, markup: Option<&str>) -> Identity {
        match SiteProfile::detect(url) {
            SiteProfile::CustomSelectors => extract_custom_selectors(markup.unwrap_or_default()),
            SiteProfile::AniWatch => extract_epnum_param(url),
            _ => Identity::empty(),
        }
    }
}

fn extract_custom_selectors(markup: &str) -> Identity {
    let capture = |re: &Regex| {
        re.captures(markup)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let identity = Identity::new(capture(&CUSTOM_TITLE), capture(&CUSTOM_EPISODE));
    if identity.is_complete() {
        debug!("Site override matched: {:?}", identity);
    } else {
        warn!("Site override found partial data: {:?}", identity);
    }
    identity
}

/// Episode number carried by our own derived next-episode URLs
/// (`?ep=next&epnum=<n>`); the site's `ep` parameter is an opaque id.
fn extract_epnum_param(url: &str) -> Identity {
    let number = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "epnum")
            .map(|(_, value)| value.into_owned())
            .filter(|value| value.chars().all(|c| c.is_ascii_digit()))
    });

    Identity::new(None, number)
}
