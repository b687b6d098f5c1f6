//! Constants module for the anime tracker
//!
//! Contains storage key builders, reserved key names and the tuning values
//! shared by the store, the prober and the save coordinator.

use std::time::Duration;

/// Key builders for the synced and local namespaces
pub mod keys {
    /// Legacy map of series key to episode array
    pub const ANIME_GROUPS: &str = "animeGroups";

    /// Suffix of the per-series index record
    pub const INFO_SUFFIX: &str = "_info";

    /// Marker that separates a series key from its chunk index
    pub const CHUNK_MARKER: &str = "_chunk_";

    /// Chunk key for a series (`<series>_chunk_<i>`)
    pub fn chunk(series: &str, index: usize) -> String {
        format!("{}{}{}", series, CHUNK_MARKER, index)
    }

    /// Index key for a series (`<series>_info`)
    pub fn info(series: &str) -> String {
        format!("{}{}", series, INFO_SUFFIX)
    }

    /// Series key of an index key, if `key` is one
    pub fn series_of_info(key: &str) -> Option<&str> {
        key.strip_suffix(INFO_SUFFIX).filter(|s| !s.is_empty())
    }

    /// Local-namespace cache key for the episode after `episode`
    pub fn next_available(series: &str, episode: &str) -> String {
        format!("nextEpisodeAvailable_{}_{}", series, episode)
    }

    /// Local-namespace cache key for the episode two after `episode`
    pub fn after_next_available(series: &str, episode: &str) -> String {
        format!("episodeAfterNextAvailable_{}_{}", series, episode)
    }
}

/// Settings stored alongside series data in the synced namespace
pub mod settings {
    pub const AUTO_SAVE: &str = "autoSave";
    pub const SAVE_NEXT: &str = "saveNext";
    pub const DELAY_TIME: &str = "delayTime";

    /// Keys that never denote a series, even though they live next to them
    pub const RESERVED_KEYS: &[&str] = &[
        AUTO_SAVE,
        SAVE_NEXT,
        DELAY_TIME,
        "darkMode",
        "cardSize",
        "activeFilter",
        super::keys::ANIME_GROUPS,
    ];

    pub fn is_reserved(key: &str) -> bool {
        RESERVED_KEYS.contains(&key)
    }
}

/// Serialized byte threshold for a single chunk.
///
/// The synced backend rejects items above 8192 bytes, key included.
pub const CHUNK_BYTE_THRESHOLD: usize = 7000;

/// Per-item quota of the synced namespace
pub const SYNC_QUOTA_BYTES_PER_ITEM: usize = 8192;

/// Total quota of the synced namespace
pub const SYNC_QUOTA_BYTES: usize = 102_400;

/// Age after which an availability entry is recomputed
pub const AVAILABILITY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Interval of the background re-validation of every known series
pub const REVALIDATE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Window in which a repeated save of the same URL is skipped
pub const DEDUPE_WINDOW: Duration = Duration::from_secs(10);

/// Age after which a dedupe entry is swept
pub const DEDUPE_SWEEP_AGE: Duration = Duration::from_secs(60);

/// Cover art used when no site probe matches
pub fn default_cover_url(series: &str) -> String {
    format!("https://gogocdn.net/cover/{}.png", series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(keys::chunk("naruto", 0), "naruto_chunk_0");
        assert_eq!(keys::info("naruto"), "naruto_info");
        assert_eq!(
            keys::next_available("demo-show", "5"),
            "nextEpisodeAvailable_demo-show_5"
        );
        assert_eq!(
            keys::after_next_available("demo-show", "5"),
            "episodeAfterNextAvailable_demo-show_5"
        );
    }

    #[test]
    fn test_series_of_info() {
        assert_eq!(keys::series_of_info("one-piece_info"), Some("one-piece"));
        assert_eq!(keys::series_of_info("_info"), None);
        assert_eq!(keys::series_of_info("one-piece_chunk_0"), None);
    }

    #[test]
    fn test_reserved_keys() {
        assert!(settings::is_reserved("autoSave"));
        assert!(settings::is_reserved("animeGroups"));
        assert!(!settings::is_reserved("naruto"));
    }
}
