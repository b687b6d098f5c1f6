//! Episode store
//!
//! The per-series "last watched" record. Reads understand every layout in
//! [`super::layout`]; writes always produce the chunked layout and then
//! clean up whatever legacy keys the series was found under.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::layout::{self, LayoutHandle};
use super::{Entries, KeyValueStore, StoreError, StoreResult};
use crate::constants::{keys, settings};
use crate::models::{EpisodeRecord, GroupInfo, HistoryEntry, LastEpisode, Settings};
use crate::normalize::{keys_match, normalize, normalize_for_comparison};

/// Record fields that describe the episode after the stored one and go
/// stale when the episode changes
const AVAILABILITY_FIELDS: &[&str] = &[
    "nextEpisodeAvailable",
    "episodeAfterNextAvailable",
    "isLastEpisode",
];

/// Result of a successful upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Normalized key the record was stored under
    pub series_key: String,
    /// The record as stored, after merging
    pub record: EpisodeRecord,
    /// Layout the series was migrated from, if it was a legacy one
    pub migrated_from: Option<&'static str>,
    pub chunk_count: usize,
}

/// Result of removing one episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// No such series or episode
    NotFound,
    /// The episode was dropped and the rest rewritten
    EpisodeRemoved { remaining: usize },
    /// The last episode was dropped along with every key of the series
    SeriesRemoved,
}

/// Episode text of a stored record, tolerating numeric values
fn episode_of(record: &Value) -> Option<String> {
    let value = record.get("episode").or_else(|| record.get("episodeNumber"))?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn record_date(record: &Value) -> Option<DateTime<Utc>> {
    match record.get("dateAdded")? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Most recently added record; on equal or missing dates the later one
fn most_recent(records: Vec<Value>) -> Option<Value> {
    records
        .into_iter()
        .enumerate()
        .max_by_key(|(idx, record)| (record_date(record), *idx))
        .map(|(_, record)| record)
}

/// Overlay `incoming` on `base`, keeping fields only the base knows
fn merge_record(base: Option<Value>, incoming: &EpisodeRecord) -> StoreResult<Value> {
    let mut merged = match base {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    if episode_of(&Value::Object(merged.clone())).as_deref() != Some(incoming.episode_number.as_str()) {
        for field in AVAILABILITY_FIELDS {
            merged.remove(*field);
        }
    }

    if let Value::Object(fields) = serde_json::to_value(incoming)? {
        merged.extend(fields);
    }
    merged.insert(
        "dateAdded".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
    );

    Ok(Value::Object(merged))
}

/// Prefer an exact comparison-form match over a containment match
fn best_match<'a>(candidates: &[&'a str], lookup: &str) -> Option<&'a str> {
    let wanted = normalize_for_comparison(lookup);
    candidates
        .iter()
        .find(|c| !wanted.is_empty() && normalize_for_comparison(c) == wanted)
        .or_else(|| candidates.iter().find(|c| keys_match(c, lookup)))
        .copied()
}

/// Series data over the synced namespace
#[derive(Clone)]
pub struct EpisodeStore {
    sync: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles over shared keys
    writes: Arc<Mutex<()>>,
}

impl EpisodeStore {
    pub fn new(sync: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sync,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Backend health
    pub async fn health_check(&self) -> StoreResult<()> {
        self.sync.health_check().await
    }

    /// Store `record` as the single record of `series_raw`, migrating any
    /// legacy layout to the chunked one.
    pub async fn upsert(&self, series_raw: &str, record: &EpisodeRecord) -> StoreResult<UpsertOutcome> {
        let series = normalize(series_raw);
        if series.is_empty() {
            return Err(StoreError::InvalidKey(series_raw.to_string()));
        }

        let _guard = self.writes.lock().await;
        let data = self.sync.get_all().await?;
        let handle = layout::locate(&data, &series);
        debug!("Upserting {} (found as {})", series, handle.label());

        let base = most_recent(layout::read_records(&data, &series, &handle));
        let merged = merge_record(base, record)?;
        let stored: EpisodeRecord = serde_json::from_value(merged.clone())?;

        let index = GroupInfo {
            chunk_count: 0,
            current_episode_number: stored.episode_number.clone(),
            next_episode_available: false,
        };
        let chunk_count = self.commit(&data, &series, vec![merged], index).await?;

        let migrated_from = handle.is_legacy().then(|| handle.label());
        if let Some(from) = migrated_from {
            info!("Migrated {} from {} layout", series, from);
        }
        info!("Saved {} episode {}", series, stored.episode_number);

        Ok(UpsertOutcome {
            series_key: series,
            record: stored,
            migrated_from,
            chunk_count,
        })
    }

    /// Write `records` in the chunked layout: chunks first, then the index.
    /// A failed index write restores the chunk keys to their prior values.
    async fn commit(
        &self,
        data: &Entries,
        series: &str,
        records: Vec<Value>,
        mut index: GroupInfo,
    ) -> StoreResult<usize> {
        let chunks = layout::split_into_chunks(records);
        let chunk_count = chunks.len();
        index.chunk_count = chunk_count;
        let index_value = serde_json::to_value(&index)?;

        let chunk_entries: Entries = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| (keys::chunk(series, i), Value::Array(chunk)))
            .collect();
        let chunk_keys: Vec<String> = chunk_entries.keys().cloned().collect();

        if let Err(e) = self.sync.set(chunk_entries).await {
            error!("Failed to write chunks for {}: {}", series, e);
            return Err(e);
        }

        if let Err(e) = self.sync.set_value(&keys::info(series), index_value).await {
            error!("Failed to write index for {}, rolling back chunks: {}", series, e);
            self.rollback(data, &chunk_keys).await;
            return Err(e);
        }

        self.cleanup(data, series, chunk_count).await;
        Ok(chunk_count)
    }

    async fn rollback(&self, data: &Entries, written: &[String]) {
        let (previous, fresh): (Vec<&String>, Vec<&String>) =
            written.iter().partition(|key| data.contains_key(*key));

        let restore: Entries = previous
            .into_iter()
            .filter_map(|key| data.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        if !restore.is_empty() {
            if let Err(e) = self.sync.set(restore).await {
                error!("Rollback failed to restore chunks: {}", e);
            }
        }

        let fresh: Vec<String> = fresh.into_iter().cloned().collect();
        if !fresh.is_empty() {
            if let Err(e) = self.sync.remove(&fresh).await {
                error!("Rollback failed to remove chunks: {}", e);
            }
        }
    }

    /// Drop stale chunks and legacy keys of `series`. Failures here leave
    /// harmless leftovers and are only logged.
    async fn cleanup(&self, data: &Entries, series: &str, chunk_count: usize) {
        let footprint = layout::footprint(data, series);

        let mut live: HashSet<String> = (0..chunk_count).map(|i| keys::chunk(series, i)).collect();
        live.insert(keys::info(series));
        let stale: Vec<String> = footprint
            .keys
            .into_iter()
            .filter(|key| !live.contains(key))
            .collect();

        if !stale.is_empty() {
            debug!("Removing stale keys for {}: {:?}", series, stale);
            if let Err(e) = self.sync.remove(&stale).await {
                warn!("Failed to remove stale keys for {}: {}", series, e);
            }
        }

        if let Err(e) = self.drop_group_map_entries(data, &footprint.group_map_entries).await {
            warn!("Failed to update {} for {}: {}", keys::ANIME_GROUPS, series, e);
        }
    }

    /// Remove entries from the `animeGroups` map, deleting the map once it
    /// is empty
    async fn drop_group_map_entries(&self, data: &Entries, entries: &[String]) -> StoreResult<()> {
        let Some(Value::Object(groups)) = data.get(keys::ANIME_GROUPS) else {
            return Ok(());
        };

        let mut groups = groups.clone();
        for entry in entries {
            groups.remove(entry);
        }

        if groups.is_empty() {
            self.sync.remove(&[keys::ANIME_GROUPS.to_string()]).await
        } else if !entries.is_empty() {
            self.sync
                .set_value(keys::ANIME_GROUPS, Value::Object(groups))
                .await
        } else {
            Ok(())
        }
    }

    /// Last saved episode of the series matching `series_raw`: the chunked
    /// layout first, then the group map, then bare keys.
    pub async fn lookup_last_episode(&self, series_raw: &str) -> StoreResult<Option<LastEpisode>> {
        let data = self.sync.get_all().await?;

        let indexed: Vec<&str> = data.keys().filter_map(|k| keys::series_of_info(k)).collect();
        if let Some(series) = best_match(&indexed, series_raw) {
            let from_index = data
                .get(&keys::info(series))
                .and_then(|info| serde_json::from_value::<GroupInfo>(info.clone()).ok())
                .map(|info| info.current_episode_number)
                .filter(|n| !n.trim().is_empty());
            let number = from_index.or_else(|| {
                let handle = layout::locate(&data, series);
                layout::read_records(&data, series, &handle)
                    .last()
                    .and_then(episode_of)
            });
            if let Some(number) = number {
                return Ok(Some(LastEpisode {
                    group_name: series.to_string(),
                    last_episode_number: number,
                }));
            }
        }

        if let Some(Value::Object(groups)) = data.get(keys::ANIME_GROUPS) {
            let candidates: Vec<&str> = groups
                .iter()
                .filter(|(_, v)| v.as_array().is_some_and(|a| !a.is_empty()))
                .map(|(k, _)| k.as_str())
                .collect();
            if let Some(found) = last_of_match(&candidates, series_raw, |k| groups.get(k)) {
                return Ok(Some(found));
            }
        }

        let bare: Vec<&str> = data
            .iter()
            .filter(|(k, v)| {
                !settings::is_reserved(k)
                    && keys::series_of_info(k).is_none()
                    && !k.contains(keys::CHUNK_MARKER)
                    && v.as_array().is_some_and(|a| !a.is_empty())
            })
            .map(|(k, _)| k.as_str())
            .collect();
        Ok(last_of_match(&bare, series_raw, |k| data.get(k)))
    }

    /// Drop episode `episode_number` of `series_raw`
    pub async fn remove(&self, series_raw: &str, episode_number: &str) -> StoreResult<RemoveOutcome> {
        let series = normalize(series_raw);
        if series.is_empty() {
            return Err(StoreError::InvalidKey(series_raw.to_string()));
        }

        let _guard = self.writes.lock().await;
        let data = self.sync.get_all().await?;
        let handle = layout::locate(&data, &series);
        if handle == LayoutHandle::Absent {
            return Ok(RemoveOutcome::NotFound);
        }

        let records = layout::read_records(&data, &series, &handle);
        let before = records.len();
        let remaining: Vec<Value> = records
            .into_iter()
            .filter(|r| episode_of(r).as_deref() != Some(episode_number.trim()))
            .collect();

        if remaining.len() == before {
            return Ok(RemoveOutcome::NotFound);
        }

        if remaining.is_empty() {
            let footprint = layout::footprint(&data, &series);
            if !footprint.keys.is_empty() {
                self.sync.remove(&footprint.keys).await?;
            }
            self.drop_group_map_entries(&data, &footprint.group_map_entries)
                .await?;
            info!("Removed series {}", series);
            return Ok(RemoveOutcome::SeriesRemoved);
        }

        let count = remaining.len();
        let current = remaining.last().and_then(episode_of).unwrap_or_default();
        let index = GroupInfo {
            chunk_count: 0,
            current_episode_number: current,
            next_episode_available: false,
        };
        self.commit(&data, &series, remaining, index).await?;
        info!("Removed episode {} of {}", episode_number, series);

        Ok(RemoveOutcome::EpisodeRemoved { remaining: count })
    }

    /// Record the probe result for the episode after the current one.
    /// Returns `false` when the series has no index to update.
    pub async fn set_next_available(&self, series: &str, available: bool) -> StoreResult<bool> {
        let info_key = keys::info(series);
        let _guard = self.writes.lock().await;
        let Some(Value::Object(mut index)) = self.sync.get_value(&info_key).await? else {
            debug!("No index for {}, skipping availability update", series);
            return Ok(false);
        };

        index.insert("nextEpisodeAvailable".to_string(), Value::Bool(available));
        self.sync.set_value(&info_key, Value::Object(index)).await?;
        Ok(true)
    }

    /// All records across layouts, newest first, one per URL
    pub async fn history(&self) -> StoreResult<Vec<HistoryEntry>> {
        let data = self.sync.get_all().await?;

        let mut entries: Vec<HistoryEntry> = collect_groups(&data)
            .into_iter()
            .flat_map(|(group_name, records)| {
                records.into_iter().filter_map(move |record| {
                    let episode = serde_json::from_value::<EpisodeRecord>(record).ok()?;
                    (!episode.title.trim().is_empty() && episode.date_added.is_some()).then(|| {
                        HistoryEntry {
                            group_name: group_name.clone(),
                            episode,
                        }
                    })
                })
            })
            .collect();

        entries.sort_by(|a, b| b.episode.date_added.cmp(&a.episode.date_added));

        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert(entry.episode.url.clone()));
        Ok(entries)
    }

    /// Latest record of every known series
    pub async fn series(&self) -> StoreResult<Vec<(String, EpisodeRecord)>> {
        let data = self.sync.get_all().await?;

        Ok(collect_groups(&data)
            .into_iter()
            .filter_map(|(series, records)| {
                let latest = most_recent(records)?;
                match serde_json::from_value::<EpisodeRecord>(latest) {
                    Ok(record) => Some((series, record)),
                    Err(e) => {
                        warn!("Skipping unreadable record of {}: {}", series, e);
                        None
                    }
                }
            })
            .collect())
    }

    /// The whole synced namespace
    pub async fn snapshot(&self) -> StoreResult<Entries> {
        self.sync.get_all().await
    }

    /// Wipe the synced namespace, settings included
    pub async fn clear(&self) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        self.sync.clear().await?;
        info!("Cleared synced storage");
        Ok(())
    }

    /// Current settings; unreadable values fall back to defaults
    pub async fn settings(&self) -> StoreResult<Settings> {
        let stored = self
            .sync
            .get(&[
                settings::AUTO_SAVE.to_string(),
                settings::SAVE_NEXT.to_string(),
                settings::DELAY_TIME.to_string(),
            ])
            .await?;

        Ok(serde_json::from_value(Value::Object(stored)).unwrap_or_else(|e| {
            warn!("Unreadable settings, using defaults: {}", e);
            Settings::default()
        }))
    }

    pub async fn update_settings(&self, new_settings: &Settings) -> StoreResult<()> {
        match serde_json::to_value(new_settings)? {
            Value::Object(entries) => self.sync.set(entries).await,
            _ => Ok(()),
        }
    }
}

/// Last episode of the first stored group matching `lookup`
fn last_of_match<'a, F>(candidates: &[&'a str], lookup: &str, records: F) -> Option<LastEpisode>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let key = best_match(candidates, lookup)?;
    let number = records(key)?.as_array()?.last().and_then(episode_of)?;
    Some(LastEpisode {
        group_name: key.to_string(),
        last_episode_number: number,
    })
}

/// Records of every series, each under the layout it is found in
fn collect_groups(data: &Entries) -> Vec<(String, Vec<Value>)> {
    layout::series_keys(data)
        .into_iter()
        .map(|series| {
            let handle = layout::locate(data, &series);
            let records = layout::read_records(data, &series, &handle);
            (series, records)
        })
        .filter(|(_, records)| !records.is_empty())
        .collect()
}
