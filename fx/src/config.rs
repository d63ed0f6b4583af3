//! Converter configuration.

use chrono::Duration as ChronoDuration;
use std::time::Duration;

use crate::cache::RateCacheConfig;
use crate::client::RetryPolicy;

/// Daily rates endpoint of the Central Bank of Russia.
pub const DEFAULT_ENDPOINT: &str = "https://www.cbr.ru/scripts/XML_daily.asp";

/// Sent with every request so the feed operator can identify us.
pub const DEFAULT_USER_AGENT: &str = concat!("CurRate/", env!("CARGO_PKG_VERSION"), " (Rust; XML)");

/// Upper bound on a feed document.
pub const DEFAULT_MAX_FEED_BYTES: usize = 4 * 1024 * 1024;

/// Settings for the fetch, decode and cache pipeline.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Feed URL, without the `date_req` parameter.
    pub endpoint: String,
    /// Overall per-request timeout.
    pub http_timeout: Duration,
    /// Redirects followed before giving up.
    pub max_redirects: usize,
    /// Attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for each later one.
    pub retry_base_delay: Duration,
    /// Cache capacity in entries.
    pub cache_max_size: usize,
    /// Lifetime of a cache entry.
    pub cache_ttl: ChronoDuration,
    /// Largest feed document the decoder accepts.
    pub max_feed_bytes: usize,
    pub user_agent: String,
    pub log_level: String,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http_timeout: Duration::from_secs(10),
            max_redirects: 10,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            cache_max_size: 100,
            cache_ttl: ChronoDuration::hours(24),
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("CURRATE_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Some(secs) = env_parse::<u64>("CURRATE_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(secs);
        }

        if let Some(redirects) = env_parse("CURRATE_MAX_REDIRECTS") {
            config.max_redirects = redirects;
        }

        if let Some(attempts) = env_parse("CURRATE_MAX_ATTEMPTS") {
            config.max_attempts = attempts;
        }

        if let Some(ms) = env_parse::<u64>("CURRATE_RETRY_BASE_DELAY_MS") {
            config.retry_base_delay = Duration::from_millis(ms);
        }

        if let Some(size) = env_parse("CURRATE_CACHE_MAX_SIZE") {
            config.cache_max_size = size;
        }

        if let Some(ttl) =
            env_parse::<i64>("CURRATE_CACHE_TTL_SECS").and_then(ChronoDuration::try_seconds)
        {
            config.cache_ttl = ttl;
        }

        if let Some(bytes) = env_parse("CURRATE_MAX_FEED_BYTES") {
            config.max_feed_bytes = bytes;
        }

        if let Ok(user_agent) = std::env::var("CURRATE_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("Endpoint URL cannot be empty".to_string());
        }

        if self.max_attempts == 0 {
            return Err("Max attempts must be at least 1".to_string());
        }

        if self.cache_max_size == 0 {
            return Err("Cache max size must be positive".to_string());
        }

        if self.cache_ttl <= ChronoDuration::zero() {
            return Err("Cache TTL must be positive".to_string());
        }

        if self.max_feed_bytes == 0 {
            return Err("Max feed size must be positive".to_string());
        }

        if self.http_timeout.is_zero() {
            return Err("HTTP timeout must be positive".to_string());
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_base_delay)
    }

    pub fn cache_config(&self) -> RateCacheConfig {
        RateCacheConfig {
            max_entries: self.cache_max_size,
            ttl: self.cache_ttl,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
