//! Physical layouts of series data
//!
//! Series have been written under three layouts over time:
//!
//! - chunked (current): `<key>_chunk_<i>` arrays plus a `<key>_info` index,
//!   with an older variant that used spaces instead of hyphens in the key;
//! - group map: one `animeGroups` object mapping series keys to arrays;
//! - bare key: the series key itself holding an array.
//!
//! A series only ever moves from a legacy layout to the chunked one.

use serde_json::Value;

use super::Entries;
use crate::constants::{keys, settings, CHUNK_BYTE_THRESHOLD};
use crate::models::GroupInfo;

/// Where a series' records currently live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutHandle {
    /// No record anywhere
    Absent,
    /// Current layout under the hyphenated key
    Chunked { chunk_count: usize },
    /// Chunked layout under the spaced form of the key
    SpacedChunked { key: String, chunk_count: usize },
    /// Entry of the `animeGroups` map
    LegacyGroupMap { key: String },
    /// Array stored directly under the (hyphenated or spaced) series key
    LegacyBareKey { key: String },
}

impl LayoutHandle {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            LayoutHandle::Absent => "absent",
            LayoutHandle::Chunked { .. } => "chunked",
            LayoutHandle::SpacedChunked { .. } => "spaced-chunked",
            LayoutHandle::LegacyGroupMap { .. } => "group-map",
            LayoutHandle::LegacyBareKey { .. } => "bare-key",
        }
    }

    pub fn is_legacy(&self) -> bool {
        !matches!(self, LayoutHandle::Absent | LayoutHandle::Chunked { .. })
    }
}

/// Spaced form of a hyphenated series key
pub fn spaced(series: &str) -> String {
    series.replace('-', " ")
}

/// Chunk count of the index at `info_key`; a present index without a
/// readable count still points at one chunk.
fn chunk_count(data: &Entries, info_key: &str) -> Option<usize> {
    let info = data.get(info_key)?;
    let count = serde_json::from_value::<GroupInfo>(info.clone())
        .map(|info| info.chunk_count)
        .unwrap_or(1);
    Some(count.max(1))
}

fn group_map(data: &Entries) -> Option<&serde_json::Map<String, Value>> {
    data.get(keys::ANIME_GROUPS).and_then(Value::as_object)
}

/// Find the layout `series` (already normalized) is stored under
pub fn locate(data: &Entries, series: &str) -> LayoutHandle {
    if let Some(chunk_count) = chunk_count(data, &keys::info(series)) {
        return LayoutHandle::Chunked { chunk_count };
    }
    if data.contains_key(&keys::chunk(series, 0)) {
        // Orphaned chunk written before a failed index write
        return LayoutHandle::Chunked { chunk_count: 1 };
    }

    let spaced_key = spaced(series);
    if spaced_key != series {
        if let Some(chunk_count) = chunk_count(data, &keys::info(&spaced_key)) {
            return LayoutHandle::SpacedChunked {
                key: spaced_key,
                chunk_count,
            };
        }
        if data.contains_key(&keys::chunk(&spaced_key, 0)) {
            return LayoutHandle::SpacedChunked {
                key: spaced_key,
                chunk_count: 1,
            };
        }
    }

    if let Some(groups) = group_map(data) {
        for candidate in [series, spaced_key.as_str()] {
            if groups.get(candidate).is_some_and(Value::is_array) {
                return LayoutHandle::LegacyGroupMap {
                    key: candidate.to_string(),
                };
            }
        }
    }

    for candidate in [series, spaced_key.as_str()] {
        if !settings::is_reserved(candidate) && data.get(candidate).is_some_and(Value::is_array) {
            return LayoutHandle::LegacyBareKey {
                key: candidate.to_string(),
            };
        }
    }

    LayoutHandle::Absent
}

fn array_items(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn chunked_records(data: &Entries, key: &str, chunk_count: usize) -> Vec<Value> {
    (0..chunk_count)
        .flat_map(|i| array_items(data.get(&keys::chunk(key, i))))
        .collect()
}

/// Every record stored for `series` under `handle`
pub fn read_records(data: &Entries, series: &str, handle: &LayoutHandle) -> Vec<Value> {
    match handle {
        LayoutHandle::Absent => Vec::new(),
        LayoutHandle::Chunked { chunk_count } => chunked_records(data, series, *chunk_count),
        LayoutHandle::SpacedChunked { key, chunk_count } => {
            chunked_records(data, key, *chunk_count)
        }
        LayoutHandle::LegacyGroupMap { key } => {
            array_items(group_map(data).and_then(|groups| groups.get(key)))
        }
        LayoutHandle::LegacyBareKey { key } => array_items(data.get(key)),
    }
}

/// Keys and map entries that hold data for `series` under any layout
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeriesFootprint {
    /// Top-level keys (index, chunks, bare arrays)
    pub keys: Vec<String>,
    /// Entries of the `animeGroups` map
    pub group_map_entries: Vec<String>,
}

/// Everything stored for `series`, hyphenated and spaced forms alike
pub fn footprint(data: &Entries, series: &str) -> SeriesFootprint {
    let mut footprint = SeriesFootprint::default();
    let spaced_key = spaced(series);
    let mut forms = vec![series.to_string()];
    if spaced_key != series {
        forms.push(spaced_key);
    }

    for form in &forms {
        let info_key = keys::info(form);
        if data.contains_key(&info_key) {
            footprint.keys.push(info_key);
        }
        let chunk_prefix = format!("{}{}", form, keys::CHUNK_MARKER);
        footprint.keys.extend(
            data.keys()
                .filter(|key| {
                    key.strip_prefix(&chunk_prefix)
                        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
                })
                .cloned(),
        );
        if !settings::is_reserved(form) && data.get(form).is_some_and(Value::is_array) {
            footprint.keys.push(form.clone());
        }
        if group_map(data).is_some_and(|groups| groups.contains_key(form)) {
            footprint.group_map_entries.push(form.clone());
        }
    }

    footprint
}

/// Split records into chunks of at most `CHUNK_BYTE_THRESHOLD` serialized
/// bytes each. A record larger than the threshold gets a chunk of its own.
pub fn split_into_chunks(records: Vec<Value>) -> Vec<Vec<Value>> {
    split_with_threshold(records, CHUNK_BYTE_THRESHOLD)
}

fn split_with_threshold(records: Vec<Value>, threshold: usize) -> Vec<Vec<Value>> {
    let mut chunks: Vec<Vec<Value>> = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    // Serialized array size: brackets plus separating commas
    let mut current_size = 2;

    for record in records {
        let size = record.to_string().len();
        let added = if current.is_empty() { size } else { size + 1 };

        if !current.is_empty() && current_size + added > threshold {
            chunks.push(std::mem::take(&mut current));
            current_size = 2 + size;
        } else {
            current_size += added;
        }
        current.push(record);
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Series keys present under any layout, in key order
pub fn series_keys(data: &Entries) -> Vec<String> {
    let mut found = std::collections::BTreeSet::new();

    for key in data.keys() {
        if let Some(series) = keys::series_of_info(key) {
            found.insert(series.to_string());
        } else if !settings::is_reserved(key)
            && !key.contains(keys::CHUNK_MARKER)
            && data.get(key).is_some_and(Value::is_array)
        {
            found.insert(key.clone());
        }
    }
    if let Some(groups) = group_map(data) {
        found.extend(
            groups
                .iter()
                .filter(|(_, v)| v.is_array())
                .map(|(k, _)| k.clone()),
        );
    }

    found.into_iter().collect()
}
