//! Recent-save guard
//!
//! Content pages report the same episode several times in quick succession
//! (load, history navigation, re-render). A URL seen within the window is
//! skipped. The check and the update happen under one lock so two
//! concurrent saves of the same URL cannot both get through.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::{DEDUPE_SWEEP_AGE, DEDUPE_WINDOW};

/// Fragment-free form of a URL, used as the guard key
fn guard_key(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

/// URLs saved recently, with when they were last admitted
pub struct RecentSaves {
    window: Duration,
    sweep_age: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Default for RecentSaves {
    fn default() -> Self {
        Self::new(DEDUPE_WINDOW)
    }
}

impl RecentSaves {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sweep_age: DEDUPE_SWEEP_AGE.max(window),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Admit `url` unless it was admitted within the window
    pub fn check_and_record(&self, url: &str) -> bool {
        self.check_and_record_at(url, Instant::now())
    }

    /// [`Self::check_and_record`] at a given instant
    pub fn check_and_record_at(&self, url: &str, now: Instant) -> bool {
        let key = guard_key(url);
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        seen.retain(|_, at| now.saturating_duration_since(*at) < self.sweep_age);

        if let Some(at) = seen.get(key) {
            if now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        seen.insert(key.to_string(), now);
        true
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn remembered(guard: &RecentSaves) -> usize {
        guard.seen.lock().unwrap().len()
    }

    #[test]
    fn test_repeat_within_window_is_rejected() {
        let guard = RecentSaves::default();
        let start = Instant::now();

        assert!(guard.check_and_record_at("https://x/a-episode-1", start));
        assert!(!guard.check_and_record_at("https://x/a-episode-1", start + Duration::from_secs(3)));
        // Fragments do not make a different page
        assert!(!guard.check_and_record_at("https://x/a-episode-1#player", start + Duration::from_secs(4)));
        assert!(guard.check_and_record_at("https://x/a-episode-2", start + Duration::from_secs(4)));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let guard = RecentSaves::default();
        let start = Instant::now();

        assert!(guard.check_and_record_at("u", start));
        assert!(guard.check_and_record_at("u", start + Duration::from_secs(11)));
        assert!(!guard.check_and_record_at("u", start + Duration::from_secs(12)));
    }

    #[test]
    fn test_old_entries_are_swept() {
        let guard = RecentSaves::default();
        let start = Instant::now();

        guard.check_and_record_at("a", start);
        guard.check_and_record_at("b", start + Duration::from_secs(30));
        assert_eq!(remembered(&guard), 2);

        guard.check_and_record_at("c", start + Duration::from_secs(61));
        assert_eq!(remembered(&guard), 2);
    }
}
