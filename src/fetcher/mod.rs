//! Page fetcher used for availability probes and live page snapshots
//!
//! This module provides an HTTP client with browser-like headers, user agent
//! rotation and retry with exponential backoff. Redirects are followed and
//! the final URL is reported so callers can tell a real episode page from a
//! redirect to a landing page.

use rand::Rng;
use reqwest::{redirect, Client};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

/// Errors that can occur while fetching a page
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network-related errors (connection timeout, DNS failure, etc.)
    #[error("Failed to connect to server: {0}")]
    NetworkError(String),

    /// Non-success HTTP status
    #[error("Server returned status {0}")]
    HttpError(u16),

    /// Error reading response body
    #[error("Failed to read response body: {0}")]
    ResponseError(String),

    /// Rate limited by server
    #[error("Rate limited, retry after delay")]
    RateLimited,
}

/// Result of a successful page fetch
#[derive(Debug)]
pub struct FetchedPage {
    /// The HTML content of the page
    pub html: String,
    /// The HTTP status code
    pub status: u16,
    /// URL after following redirects
    pub final_url: Url,
}

/// Configuration of the fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Minimum delay between requests in milliseconds
    pub min_delay_ms: u64,
    /// Maximum delay between requests in milliseconds
    pub max_delay_ms: u64,
    /// Whether to rotate user agents
    pub rotate_user_agent: bool,
    /// Maximum attempts per fetch
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds
    pub backoff_base_ms: u64,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 250,
            max_delay_ms: 750,
            rotate_user_agent: true,
            max_retries: 3,
            backoff_base_ms: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl FetcherConfig {
    /// No pacing and a single attempt, for interactive calls and tests
    pub fn immediate() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            max_retries: 1,
            backoff_base_ms: 0,
            ..Self::default()
        }
    }
}

/// List of realistic user agents for rotation
const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// HTTP client for episode pages
pub struct PageFetcher {
    client: Client,
    config: FetcherConfig,
    request_count: AtomicUsize,
}

impl PageFetcher {
    /// Create a fetcher with the given configuration
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            request_count: AtomicUsize::new(0),
        })
    }

    fn user_agent(&self) -> &'static str {
        if self.config.rotate_user_agent {
            let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
            USER_AGENTS[idx]
        } else {
            USER_AGENTS[0]
        }
    }

    async fn apply_delay(&self) {
        if self.config.max_delay_ms == 0 {
            return;
        }
        let delay =
            rand::thread_rng().gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
        sleep(Duration::from_millis(delay)).await;
    }

    async fn apply_backoff(&self, attempt: u32) {
        let delay = self.config.backoff_base_ms * 2u64.pow(attempt);
        let jitter = rand::thread_rng().gen_range(0..250);
        sleep(Duration::from_millis(delay + jitter)).await;
    }

    /// Fetch a page, following redirects and retrying 429/5xx with backoff
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        if count > 0 {
            self.apply_delay().await;
        }

        let mut last_error = None;

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                self.apply_backoff(attempt).await;
            }

            match self.do_fetch(url).await {
                Ok(page) => return Ok(page),
                Err(FetchError::RateLimited) => {
                    tracing::warn!("Rate limited on attempt {}, backing off...", attempt + 1);
                    last_error = Some(FetchError::RateLimited);
                }
                Err(FetchError::HttpError(status)) if status >= 500 => {
                    tracing::warn!("HTTP {} on attempt {}, retrying...", status, attempt + 1);
                    last_error = Some(FetchError::HttpError(status));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(FetchError::NetworkError("Max retries exceeded".to_string())))
    }

    async fn do_fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9,ar;q=0.8")
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::NetworkError("Connection timeout".to_string())
                } else if e.is_connect() {
                    FetchError::NetworkError("Failed to connect to server".to_string())
                } else {
                    FetchError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::HttpError(status.as_u16()));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::ResponseError(e.to_string()))?;

        Ok(FetchedPage {
            html,
            status: status.as_u16(),
            final_url,
        })
    }

    /// Number of fetches started since creation
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_config() {
        let config = FetcherConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.rotate_user_agent);
        assert!(config.min_delay_ms <= config.max_delay_ms);
    }

    #[test]
    fn test_user_agent_is_from_list() {
        let fetcher = PageFetcher::new(FetcherConfig::default()).unwrap();
        assert!(USER_AGENTS.contains(&fetcher.user_agent()));
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>new</html>"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(FetcherConfig::immediate()).unwrap();
        let page = fetcher.fetch_page(&format!("{}/old", server.uri())).await.unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.final_url.path(), "/new");
        assert!(page.html.contains("new"));
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_reports_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(FetcherConfig::immediate()).unwrap();
        let result = fetcher.fetch_page(&format!("{}/missing", server.uri())).await;
        assert!(matches!(result, Err(FetchError::HttpError(404))));
    }
}
