//! Save coordinator
//!
//! Entry point for observed episode pages: dedupe, settings, identity
//! resolution (with a live page fallback), record construction, upsert,
//! availability refresh and export. Also serves the read-side operations
//! the HTTP layer exposes.

pub mod dedupe;

pub use dedupe::RecentSaves;

use async_trait::async_trait;
use futures::future::join_all;
use scraper::{Html, Selector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::availability::{AvailabilityReport, AvailabilityService};
use crate::error::{AppError, AppResult, EXTRACTION_FAILED};
use crate::export::Exporter;
use crate::extract::{episode_info, extract_cover_image, ExtractorChain};
use crate::fetcher::{FetchError, PageFetcher};
use crate::models::{
    EpisodeRecord, HistoryEntry, Identity, LastEpisode, LinkLookup, PageEpisodeInfo, Settings,
};
use crate::normalize::normalize;
use crate::sites::SiteProfile;
use crate::store::{EpisodeStore, RemoveOutcome};

/// Source of live page markup for pages observed without it
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn snapshot(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn snapshot(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.fetch_page(url).await?.html)
    }
}

/// An episode page the user is watching
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub episode_url: String,
    /// The observation is for the episode after the one on screen
    pub save_next: bool,
    pub page_markup: Option<String>,
}

/// What a save request ended in
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved {
        series_key: String,
        episode_number: String,
        availability: Option<AvailabilityReport>,
        export_path: Option<PathBuf>,
    },
    /// Same URL saved moments ago
    Deduplicated,
    AutoSaveDisabled,
    /// No title or episode number could be determined
    Unresolved,
}

impl SaveOutcome {
    /// Advisory text returned alongside a successful response
    pub fn message(&self) -> Option<&'static str> {
        match self {
            SaveOutcome::Unresolved => Some(EXTRACTION_FAILED),
            _ => None,
        }
    }
}

/// Whether an AniWatch-style episode list lacks the episode after `episode`
fn is_last_listed(markup: &str, episode: u64) -> Option<bool> {
    let next = episode.checked_add(1)?;
    let selector = Selector::parse(&format!("[data-number=\"{}\"]", next)).ok()?;
    Some(Html::parse_document(markup).select(&selector).next().is_none())
}

/// Title and episode of an episode link (`<title>-episode-<n>`)
fn parse_episode_link(link_url: &str) -> AppResult<(String, String)> {
    let parsed = Url::parse(link_url).map_err(|_| AppError::invalid_url())?;
    let last = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_else(AppError::extraction)?;
    let last = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());

    let (title, current) = last.split_once("-episode-").ok_or_else(AppError::extraction)?;
    if title.is_empty() || current.is_empty() {
        return Err(AppError::extraction());
    }
    Ok((title.to_string(), current.to_string()))
}

/// Orchestrates saves and the read-side operations around them
pub struct SaveCoordinator {
    episodes: EpisodeStore,
    availability: AvailabilityService,
    pages: Arc<dyn PageSource>,
    chain: ExtractorChain,
    recent: RecentSaves,
    exporter: Option<Exporter>,
}

impl SaveCoordinator {
    pub fn new(
        episodes: EpisodeStore,
        availability: AvailabilityService,
        pages: Arc<dyn PageSource>,
    ) -> Self {
        Self {
            episodes,
            availability,
            pages,
            chain: ExtractorChain::default(),
            recent: RecentSaves::default(),
            exporter: None,
        }
    }

    pub fn with_exporter(mut self, exporter: Option<Exporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.recent = RecentSaves::new(window);
        self
    }

    pub fn episodes(&self) -> &EpisodeStore {
        &self.episodes
    }

    /// Save the episode behind an observed page
    pub async fn save_observed_episode(&self, observation: Observation) -> AppResult<SaveOutcome> {
        let url = observation.episode_url.trim();

        let settings = self.episodes.settings().await?;
        if !settings.auto_save {
            info!("Auto-save disabled, not saving {}", url);
            return Ok(SaveOutcome::AutoSaveDisabled);
        }

        // Checked and recorded in one step, before any page or store work
        if !self.recent.check_and_record(url) {
            debug!("Skipping repeated save of {}", url);
            return Ok(SaveOutcome::Deduplicated);
        }
        if observation.save_next && settings.delay_time > 0 {
            debug!("Waiting {}s before saving {}", settings.delay_time, url);
            tokio::time::sleep(Duration::from_secs(settings.delay_time)).await;
        }

        let mut markup = observation.page_markup.filter(|m| !m.trim().is_empty());
        let mut identity = self.chain.resolve(url, markup.as_deref());

        // The live page also feeds the cover image and the last-episode check
        if markup.is_none() || !identity.is_complete() {
            match self.pages.snapshot(url).await {
                Ok(html) => {
                    if !identity.is_complete() {
                        let from_page = episode_info(url, &html)
                            .map(|info| Identity::new(Some(info.anime_title), info.episode_number))
                            .unwrap_or_default();
                        identity = identity
                            .fill_from(&from_page)
                            .fill_from(&self.chain.resolve(url, Some(html.as_str())));
                    }
                    markup = Some(html);
                }
                Err(e) => warn!("Could not fetch {} for page details: {}", url, e),
            }
        }

        let (Some(title), Some(episode_number)) = (identity.anime_title, identity.episode_number)
        else {
            warn!("Could not determine episode info for {}", url);
            return Ok(SaveOutcome::Unresolved);
        };

        let series_key = normalize(&title);
        if series_key.is_empty() {
            warn!("Title {:?} of {} normalizes to nothing", title, url);
            return Ok(SaveOutcome::Unresolved);
        }

        let mut record = EpisodeRecord::new(&series_key, &episode_number, url);
        record.cover_image_url = Some(extract_cover_image(url, markup.as_deref(), &series_key));

        if SiteProfile::detect(url) == SiteProfile::AniWatch {
            if let (Some(html), Some(current)) = (markup.as_deref(), record.numeric_episode()) {
                let is_last = is_last_listed(html, current);
                record.is_last_episode = is_last;
                record.next_episode_available = is_last.map(|last| !last);
                record.episode_after_next_available = is_last.map(|last| !last);
            }
        }

        let saved = self.episodes.upsert(&series_key, &record).await?;

        let availability = match self
            .availability
            .refresh(&saved.series_key, &saved.record, true)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!("Availability update for {} failed: {}", saved.series_key, e);
                None
            }
        };

        let export_path = self.export().await;

        Ok(SaveOutcome::Saved {
            series_key: saved.series_key,
            episode_number: saved.record.episode_number,
            availability,
            export_path,
        })
    }

    /// Write a snapshot export, logging instead of failing
    async fn export(&self) -> Option<PathBuf> {
        let exporter = self.exporter.as_ref()?;
        let snapshot = match self.episodes.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not read storage for export: {}", e);
                return None;
            }
        };

        match exporter.export(&snapshot).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Export to {} failed: {}", exporter.dir().display(), e);
                None
            }
        }
    }

    /// Re-check availability of every known series
    pub async fn revalidate_all(&self, force: bool) -> AppResult<Vec<AvailabilityReport>> {
        let series = self.episodes.series().await?;
        info!("Re-validating {} series", series.len());

        let results = join_all(
            series
                .iter()
                .map(|(key, record)| self.availability.refresh(key, record, force)),
        )
        .await;

        let mut reports = Vec::new();
        for ((key, _), result) in series.iter().zip(results) {
            match result {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => debug!("No availability answer for {}", key),
                Err(e) => error!("Re-validation of {} failed: {}", key, e),
            }
        }
        Ok(reports)
    }

    /// Last saved episode of the series an episode link points into
    pub async fn last_episode_for_link(&self, link_url: &str) -> AppResult<LinkLookup> {
        let (title, current_episode) = parse_episode_link(link_url)?;

        let found = self
            .episodes
            .lookup_last_episode(&title)
            .await?
            .ok_or_else(AppError::no_saved_episodes)?;

        Ok(LinkLookup {
            group_name: found.group_name,
            last_episode: found.last_episode_number,
            current_episode,
            url: link_url.to_string(),
        })
    }

    /// Probe a next-episode URL on behalf of a page and cache the answer
    pub async fn check_next_episode(
        &self,
        next_url: &str,
        series: &str,
        episode: &str,
    ) -> AppResult<bool> {
        Ok(self
            .availability
            .check_next_episode(next_url, series, episode)
            .await?)
    }

    /// Episode info of a page, from supplied markup or a live fetch
    pub async fn episode_info(
        &self,
        url: Option<&str>,
        markup: Option<String>,
    ) -> AppResult<Option<PageEpisodeInfo>> {
        let markup = match (markup, url) {
            (Some(markup), _) => markup,
            (None, Some(url)) => {
                Url::parse(url).map_err(|_| AppError::invalid_url())?;
                self.pages.snapshot(url).await?
            }
            (None, None) => return Err(AppError::validation("url or pageMarkup is required")),
        };
        Ok(episode_info(url.unwrap_or_default(), &markup))
    }

    /// Live markup of a page
    pub async fn page_dom(&self, url: &str) -> AppResult<String> {
        Url::parse(url).map_err(|_| AppError::invalid_url())?;
        Ok(self.pages.snapshot(url).await?)
    }

    /// Wipe saved series, settings and cached availability
    pub async fn clear_storage(&self) -> AppResult<()> {
        self.episodes.clear().await?;
        self.availability.cache().clear().await?;
        Ok(())
    }

    pub async fn history(&self) -> AppResult<Vec<HistoryEntry>> {
        Ok(self.episodes.history().await?)
    }

    pub async fn last_episode(&self, series: &str) -> AppResult<LastEpisode> {
        self.episodes
            .lookup_last_episode(series)
            .await?
            .ok_or_else(AppError::no_saved_episodes)
    }

    pub async fn remove_episode(&self, series: &str, episode: &str) -> AppResult<RemoveOutcome> {
        match self.episodes.remove(series, episode).await? {
            RemoveOutcome::NotFound => Err(AppError::not_found(format!(
                "episode {} of {} not found",
                episode, series
            ))),
            outcome => Ok(outcome),
        }
    }

    pub async fn settings(&self) -> AppResult<Settings> {
        Ok(self.episodes.settings().await?)
    }

    pub async fn update_settings(&self, settings: &Settings) -> AppResult<()> {
        Ok(self.episodes.update_settings(settings).await?)
    }
}
