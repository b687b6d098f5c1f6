//! Data models for the anime tracker
//!
//! This module contains the persisted records (episode, group index,
//! availability cache entry), the identity produced by extraction and the
//! JSON envelopes returned by the HTTP API.
//!
//! Persisted field names follow the layout written by earlier versions of
//! the extension (`episode`, `chunks`, `currentEpisode`, `lastChecked`) so
//! that existing data keeps deserializing; the descriptive names are
//! accepted as aliases on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Deserialize a value that should be text but may have been stored as a
/// number (or anything else) by an older writer.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Deserialize a timestamp, mapping unparseable input to `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    })
}

/// One observed episode, the "last watched" pointer of a series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRecord {
    /// Display title, `"<series> Episode <n>"`
    #[serde(default)]
    pub title: String,
    /// Episode number as text; tolerated even when not numeric
    #[serde(rename = "episode", alias = "episodeNumber", deserialize_with = "lenient_string", default)]
    pub episode_number: String,
    /// Page URL of the episode
    #[serde(default)]
    pub url: String,
    /// Last time this record was written
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date_added: Option<DateTime<Utc>>,
    /// Best-effort cover art URL
    #[serde(default)]
    pub cover_image_url: Option<String>,
    /// Whether the following episode exists, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_episode_available: Option<bool>,
    /// Whether the episode after the next one exists, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_after_next_available: Option<bool>,
    /// Site-provided signal that no later episode is listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last_episode: Option<bool>,
}

impl EpisodeRecord {
    /// Build a fresh record for `series` stamped with the current time
    pub fn new(series: &str, episode_number: &str, url: &str) -> Self {
        Self {
            title: format!("{} Episode {}", series, episode_number),
            episode_number: episode_number.to_string(),
            url: url.to_string(),
            date_added: Some(Utc::now()),
            cover_image_url: None,
            next_episode_available: None,
            episode_after_next_available: None,
            is_last_episode: None,
        }
    }

    /// Episode number as an integer, when it is one
    pub fn numeric_episode(&self) -> Option<u64> {
        self.episode_number.trim().parse().ok()
    }
}

/// Per-series index record of the chunked layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    /// Number of `<series>_chunk_<i>` keys
    #[serde(rename = "chunks", alias = "chunkCount", default)]
    pub chunk_count: usize,
    /// Episode number of the current record
    #[serde(
        rename = "currentEpisode",
        alias = "currentEpisodeNumber",
        deserialize_with = "lenient_string",
        default
    )]
    pub current_episode_number: String,
    /// Result of the last probe for the following episode
    #[serde(default)]
    pub next_episode_available: bool,
}

/// How far ahead an availability entry looks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Horizon {
    /// The episode right after the current one
    Next,
    /// The episode two after the current one
    AfterNext,
}

impl Horizon {
    /// Episode number this horizon points at, relative to `current`
    pub fn offset(&self) -> u64 {
        match self {
            Horizon::Next => 1,
            Horizon::AfterNext => 2,
        }
    }

    /// Local-namespace key of the cache entry
    pub fn cache_key(&self, series: &str, episode: &str) -> String {
        match self {
            Horizon::Next => crate::constants::keys::next_available(series, episode),
            Horizon::AfterNext => crate::constants::keys::after_next_available(series, episode),
        }
    }
}

/// Cached result of an availability probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCacheEntry {
    pub is_available: bool,
    /// Epoch milliseconds of the probe
    #[serde(rename = "lastChecked", alias = "lastCheckedAt", default)]
    pub last_checked: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last_episode: Option<bool>,
}

impl AvailabilityCacheEntry {
    pub fn checked_now(is_available: bool) -> Self {
        Self {
            is_available,
            last_checked: Utc::now().timestamp_millis(),
            is_last_episode: None,
        }
    }
}

/// Title and episode number derived from a page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub anime_title: Option<String>,
    pub episode_number: Option<String>,
}

impl Identity {
    pub fn new(anime_title: Option<String>, episode_number: Option<String>) -> Self {
        Self {
            anime_title: anime_title.filter(|s| !s.trim().is_empty()),
            episode_number: episode_number.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Both title and episode number are present
    pub fn is_complete(&self) -> bool {
        self.anime_title.is_some() && self.episode_number.is_some()
    }

    /// Fill missing fields from `other`; fields already set win
    pub fn fill_from(mut self, other: &Identity) -> Self {
        if self.anime_title.is_none() {
            self.anime_title = other.anime_title.clone();
        }
        if self.episode_number.is_none() {
            self.episode_number = other.episode_number.clone();
        }
        self
    }
}

/// Episode info as read from a live page (the `getEpisodeInfo` answer)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageEpisodeInfo {
    pub anime_title: String,
    pub episode_number: Option<String>,
    pub episode_title: Option<String>,
    pub url: String,
}

/// Answer of a last-episode lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastEpisode {
    /// Key the series is stored under
    pub group_name: String,
    pub last_episode_number: String,
}

/// Answer of a "show last episode" lookup for an episode link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkLookup {
    pub group_name: String,
    /// Last saved episode of the series
    pub last_episode: String,
    /// Episode the link points at
    pub current_episode: String,
    pub url: String,
}

/// One row of the history view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub group_name: String,
    pub episode: EpisodeRecord,
}

/// User settings kept in the synced namespace next to series data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub auto_save: bool,
    #[serde(default)]
    pub save_next: bool,
    /// Seconds to wait before a save-next save
    #[serde(default = "default_delay")]
    pub delay_time: u64,
}

fn default_true() -> bool {
    true
}

fn default_delay() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_save: true,
            save_next: false,
            delay_time: default_delay(),
        }
    }
}

/// Generic API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the operation was successful (always true for this type)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// ISO timestamp of the response
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Create a new successful API response with the current timestamp
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Whether the operation was successful (always false for errors)
    pub success: bool,
    /// Error message describing what went wrong
    pub error: String,
    /// ISO timestamp of when the error occurred
    pub timestamp: String,
}

impl ApiError {
    /// Create a new API error response with the current timestamp
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
