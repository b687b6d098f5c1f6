//! Configuration module for the anime tracker
//!
//! Handles loading environment variables and application configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::constants::{AVAILABILITY_TTL, DEDUPE_WINDOW, REVALIDATE_INTERVAL};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Postgres connection URL; the in-memory backend is used when unset
    pub database_url: Option<String>,
    /// Directory for snapshot exports; exports are off when unset
    pub export_dir: Option<PathBuf>,
    /// Age after which cached availability is re-probed
    pub availability_ttl: Duration,
    /// Interval of the background re-validation
    pub revalidate_interval: Duration,
    /// Window in which a repeated save of one URL is skipped
    pub dedupe_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: None,
            export_dir: None,
            availability_ttl: AVAILABILITY_TTL,
            revalidate_interval: REVALIDATE_INTERVAL,
            dedupe_window: DEDUPE_WINDOW,
        }
    }
}

/// Parse `raw`, falling back to `default` with a warning
fn parse_or<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("{} has unparseable value {:?}, using default", name, value);
            default
        }),
        None => default,
    }
}

/// Non-empty value of an environment variable
fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(non_empty)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let hours = |name: &str, default: Duration| {
            Duration::from_secs(
                parse_or(name, lookup(name), default.as_secs() / 3600).saturating_mul(3600),
            )
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", lookup("PORT"), defaults.port),
            database_url: lookup("DATABASE_URL"),
            export_dir: lookup("EXPORT_DIR").map(PathBuf::from),
            availability_ttl: hours("AVAILABILITY_TTL_HOURS", defaults.availability_ttl),
            revalidate_interval: hours("REVALIDATE_INTERVAL_HOURS", defaults.revalidate_interval),
            dedupe_window: Duration::from_secs(parse_or(
                "DEDUPE_WINDOW_SECS",
                lookup("DEDUPE_WINDOW_SECS"),
                defaults.dedupe_window.as_secs(),
            )),
        }
    }
}
