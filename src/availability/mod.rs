//! Next-episode availability
//!
//! Probes whether the episode after a saved one has been published, caches
//! the answer in the local namespace and keeps the series index in sync.
//! A probe never fails: anything short of a real episode page is `false`.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;

use crate::fetcher::PageFetcher;
use crate::models::{AvailabilityCacheEntry, EpisodeRecord, Horizon};
use crate::sites::SiteProfile;
use crate::store::{EpisodeStore, Entries, KeyValueStore, StoreResult};

/// Paths sites redirect to instead of answering 404
fn is_landing_path(path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    path == "/"
        || trimmed.is_empty()
        || trimmed == "/index.html"
        || trimmed.ends_with("/404")
        || trimmed.ends_with("/error")
}

/// Decide whether a probe response is a real episode page.
///
/// The status must be 2xx and the final path must not be a landing page;
/// it must either be the requested path or still look like an episode page
/// after percent-decoding.
pub fn evaluate_probe(requested: &Url, final_url: &Url, status: u16) -> bool {
    if !(200..300).contains(&status) {
        return false;
    }

    let final_path = final_url.path();
    if is_landing_path(final_path) {
        return false;
    }
    if final_path == requested.path() {
        return true;
    }

    let decoded = urlencoding::decode(final_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| final_path.to_string());
    decoded.contains("-episode-") || decoded.contains("حلقة-")
}

/// HTTP probe for episode pages
pub struct AvailabilityProber {
    fetcher: Arc<PageFetcher>,
}

impl AvailabilityProber {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Whether `url` resolves to a published episode page
    pub async fn check_available(&self, url: &str) -> bool {
        let requested = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!("Not probing unparseable URL {}: {}", url, e);
                return false;
            }
        };

        let profile = SiteProfile::from_url(&requested);
        if !profile.supports_probing() {
            debug!("{} pages are not probed: {}", profile.name(), url);
            return false;
        }

        match self.fetcher.fetch_page(url).await {
            Ok(page) => {
                let available = evaluate_probe(&requested, &page.final_url, page.status);
                debug!(
                    "Probe {} -> {} ({}): {}",
                    url, page.final_url, page.status, available
                );
                available
            }
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Availability answers kept in the local namespace
pub struct AvailabilityCache {
    local: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub fn new(local: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { local, ttl }
    }

    /// Entry younger than the TTL at `now_ms`
    pub fn is_fresh(&self, entry: &AvailabilityCacheEntry, now_ms: i64) -> bool {
        let age = now_ms.saturating_sub(entry.last_checked);
        age >= 0 && (age as u128) < self.ttl.as_millis()
    }

    /// Stored entry, fresh or not; unreadable entries count as absent
    pub async fn get(
        &self,
        series: &str,
        episode: &str,
        horizon: Horizon,
    ) -> StoreResult<Option<AvailabilityCacheEntry>> {
        let key = horizon.cache_key(series, episode);
        Ok(self
            .local
            .get_value(&key)
            .await?
            .and_then(|value| match serde_json::from_value(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Ignoring unreadable cache entry {}: {}", key, e);
                    None
                }
            }))
    }

    /// Stored entry only when it is still fresh
    pub async fn fresh(
        &self,
        series: &str,
        episode: &str,
        horizon: Horizon,
    ) -> StoreResult<Option<AvailabilityCacheEntry>> {
        let now = Utc::now().timestamp_millis();
        Ok(self
            .get(series, episode, horizon)
            .await?
            .filter(|entry| self.is_fresh(entry, now)))
    }

    pub async fn put(
        &self,
        series: &str,
        episode: &str,
        horizon: Horizon,
        entry: &AvailabilityCacheEntry,
    ) -> StoreResult<()> {
        self.local
            .set_value(&horizon.cache_key(series, episode), serde_json::to_value(entry)?)
            .await
    }

    /// Write both horizons in one batch
    pub async fn put_pair(
        &self,
        series: &str,
        episode: &str,
        next: &AvailabilityCacheEntry,
        after_next: &AvailabilityCacheEntry,
    ) -> StoreResult<()> {
        let mut entries = Entries::new();
        entries.insert(
            Horizon::Next.cache_key(series, episode),
            serde_json::to_value(next)?,
        );
        entries.insert(
            Horizon::AfterNext.cache_key(series, episode),
            serde_json::to_value(after_next)?,
        );
        self.local.set(entries).await
    }

    /// Drop every cached answer
    pub async fn clear(&self) -> StoreResult<()> {
        self.local.clear().await
    }
}

/// Availability of the two episodes after a saved one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub group_name: String,
    pub episode: String,
    pub next_episode_available: bool,
    pub episode_after_next_available: bool,
    /// Answer served from a fresh cache entry
    pub from_cache: bool,
}

/// Prober, cache and series index working together
pub struct AvailabilityService {
    prober: AvailabilityProber,
    cache: AvailabilityCache,
    episodes: EpisodeStore,
}

impl AvailabilityService {
    pub fn new(prober: AvailabilityProber, cache: AvailabilityCache, episodes: EpisodeStore) -> Self {
        Self {
            prober,
            cache,
            episodes,
        }
    }

    pub fn prober(&self) -> &AvailabilityProber {
        &self.prober
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Bring the availability of the episodes after `record` up to date.
    ///
    /// Fresh cache entries are served as-is unless `force` is set. Returns
    /// `None` when nothing can be said: a non-numeric episode, a URL with no
    /// episode marker, or an unprobed site without a last-episode signal.
    pub async fn refresh(
        &self,
        series: &str,
        record: &EpisodeRecord,
        force: bool,
    ) -> StoreResult<Option<AvailabilityReport>> {
        let Some(current) = record.numeric_episode() else {
            debug!("{} episode {:?} is not numeric", series, record.episode_number);
            return Ok(None);
        };
        let episode = record.episode_number.trim();
        let profile = SiteProfile::detect(&record.url);

        if !profile.supports_probing() {
            return match record.is_last_episode {
                Some(is_last) => self
                    .record_last_episode_signal(series, episode, is_last)
                    .await
                    .map(Some),
                None => Ok(None),
            };
        }

        if !force {
            let next = self.cache.fresh(series, episode, Horizon::Next).await?;
            let after_next = self.cache.fresh(series, episode, Horizon::AfterNext).await?;
            if let (Some(next), Some(after_next)) = (next, after_next) {
                debug!("Availability of {} {} served from cache", series, episode);
                return Ok(Some(AvailabilityReport {
                    group_name: series.to_string(),
                    episode: episode.to_string(),
                    next_episode_available: next.is_available,
                    episode_after_next_available: after_next.is_available,
                    from_cache: true,
                }));
            }
        }

        let (Some(next_number), Some(after_next_number)) = (
            current.checked_add(Horizon::Next.offset()),
            current.checked_add(Horizon::AfterNext.offset()),
        ) else {
            debug!("{} episode {} has no successor number", series, episode);
            return Ok(None);
        };

        let (Some(next_url), Some(after_next_url)) = (
            profile.episode_url(&record.url, next_number),
            profile.episode_url(&record.url, after_next_number),
        ) else {
            debug!("No episode marker to rewrite in {}", record.url);
            return Ok(None);
        };

        let (next, after_next) = tokio::join!(
            self.prober.check_available(&next_url),
            self.prober.check_available(&after_next_url)
        );

        self.cache
            .put_pair(
                series,
                episode,
                &AvailabilityCacheEntry::checked_now(next),
                &AvailabilityCacheEntry::checked_now(after_next),
            )
            .await?;
        self.episodes.set_next_available(series, next).await?;

        info!(
            "{} episode {}: next available={}, after next available={}",
            series, episode, next, after_next
        );
        Ok(Some(AvailabilityReport {
            group_name: series.to_string(),
            episode: episode.to_string(),
            next_episode_available: next,
            episode_after_next_available: after_next,
            from_cache: false,
        }))
    }

    /// Derive both horizons from a site's "no later episode listed" signal
    pub async fn record_last_episode_signal(
        &self,
        series: &str,
        episode: &str,
        is_last: bool,
    ) -> StoreResult<AvailabilityReport> {
        let entry = AvailabilityCacheEntry {
            is_last_episode: Some(is_last),
            ..AvailabilityCacheEntry::checked_now(!is_last)
        };
        self.cache.put_pair(series, episode, &entry, &entry).await?;
        self.episodes.set_next_available(series, !is_last).await?;

        Ok(AvailabilityReport {
            group_name: series.to_string(),
            episode: episode.to_string(),
            next_episode_available: !is_last,
            episode_after_next_available: !is_last,
            from_cache: false,
        })
    }

    /// Probe a caller-supplied next-episode URL and cache the answer.
    ///
    /// Sites that cannot be probed answer `false` and leave the cache alone,
    /// their last-episode signal stays authoritative.
    pub async fn check_next_episode(
        &self,
        next_url: &str,
        series: &str,
        episode: &str,
    ) -> StoreResult<bool> {
        if !SiteProfile::detect(next_url).supports_probing() {
            debug!("Not probing {}, keeping cached signal for {}", next_url, series);
            return Ok(false);
        }

        let available = self.prober.check_available(next_url).await;
        self.cache
            .put(
                series,
                episode,
                Horizon::Next,
                &AvailabilityCacheEntry::checked_now(available),
            )
            .await?;
        Ok(available)
    }
}
