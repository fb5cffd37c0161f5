use crate::{Error, Result};
use std::time::Duration;

/// Fixed desktop Chrome identity sent on every outbound request. SearXNG
/// instances and many target sites filter obvious bot user agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Process-wide settings, constructed once at startup.
///
/// Components never read the environment themselves; they receive a
/// `Settings` reference. Each knob accepts a `SEARXPIPE_`-prefixed variable
/// with an unprefixed fallback for compatibility with existing deployments.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the SearXNG instance.
    pub searxng_url: String,
    /// Per-attempt timeout for plain HTTP operations.
    pub requests_timeout: Duration,
    /// Navigation budget for one browser unit; the per-item dynamic-content
    /// wait is granted on top of this.
    pub browser_timeout: Duration,
    /// Truncation cap for extracted page text, in chars.
    pub max_content_length: usize,
    /// Upper clamp for per-query result counts.
    pub max_num_results: usize,
    /// Total attempts per item (first try included).
    pub max_retries: u32,
    /// Base backoff delay; doubles per failed attempt.
    pub retry_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            searxng_url: "http://localhost:8080".to_string(),
            requests_timeout: Duration::from_secs(10),
            browser_timeout: Duration::from_millis(30_000),
            max_content_length: 10_000,
            max_num_results: 50,
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

fn env_string(prefixed: &str, fallback: &str) -> Option<String> {
    std::env::var(prefixed)
        .ok()
        .or_else(|| std::env::var(fallback).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(prefixed: &str, fallback: &str) -> Result<Option<T>> {
    match env_string(prefixed, fallback) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            Error::Config(format!("{prefixed} (or {fallback}): cannot parse {raw:?}"))
        }),
    }
}

impl Settings {
    /// Load settings from the process environment. Malformed values abort
    /// startup; this is the only process-fatal error path.
    pub fn from_env() -> Result<Self> {
        let mut out = Self::default();

        if let Some(url) = env_string("SEARXPIPE_SEARXNG_URL", "SEARXNG_URL") {
            url::Url::parse(&url).map_err(|e| {
                Error::Config(format!("SEARXPIPE_SEARXNG_URL (or SEARXNG_URL): {e}"))
            })?;
            out.searxng_url = url;
        }
        if let Some(s) = env_parse::<u64>("SEARXPIPE_REQUESTS_TIMEOUT", "REQUESTS_TIMEOUT")? {
            out.requests_timeout = Duration::from_secs(s.clamp(1, 300));
        }
        if let Some(ms) = env_parse::<u64>("SEARXPIPE_BROWSER_TIMEOUT", "BROWSER_TIMEOUT")? {
            out.browser_timeout = Duration::from_millis(ms.clamp(1_000, 300_000));
        }
        if let Some(n) = env_parse::<usize>("SEARXPIPE_MAX_CONTENT_LENGTH", "MAX_CONTENT_LENGTH")? {
            out.max_content_length = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("SEARXPIPE_MAX_NUM_RESULTS", "MAX_NUM_RESULTS")? {
            out.max_num_results = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("SEARXPIPE_MAX_RETRIES", "MAX_RETRIES")? {
            out.max_retries = n.clamp(1, 10);
        }
        if let Some(ms) = env_parse::<u64>("SEARXPIPE_RETRY_DELAY_MS", "RETRY_DELAY_MS")? {
            out.retry_delay = Duration::from_millis(ms);
        } else if let Some(s) = env_parse::<f64>("SEARXPIPE_RETRY_DELAY", "RETRY_DELAY")? {
            // Float seconds for compatibility. Rejects negative, non-finite
            // and out-of-range values in one place.
            out.retry_delay = Duration::try_from_secs_f64(s).map_err(|_| {
                Error::Config(format!(
                    "SEARXPIPE_RETRY_DELAY (or RETRY_DELAY): must be a non-negative number of seconds, got {s}"
                ))
            })?;
        }

        Ok(out)
    }

    /// SearXNG JSON search endpoint. Accepts either a bare base URL or a
    /// full `/search` endpoint.
    pub fn searxng_search_endpoint(&self) -> String {
        let mut base = self.searxng_url.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.searxng_url, "http://localhost:8080");
        assert_eq!(s.requests_timeout, Duration::from_secs(10));
        assert_eq!(s.browser_timeout, Duration::from_millis(30_000));
        assert_eq!(s.max_content_length, 10_000);
        assert_eq!(s.max_num_results, 50);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.retry_delay, Duration::from_millis(1_000));
    }

    #[test]
    fn search_endpoint_accepts_base_or_full() {
        let mut s = Settings::default();
        s.searxng_url = "http://localhost:8080".to_string();
        assert_eq!(s.searxng_search_endpoint(), "http://localhost:8080/search");
        s.searxng_url = "http://localhost:8080/".to_string();
        assert_eq!(s.searxng_search_endpoint(), "http://localhost:8080/search");
        s.searxng_url = "http://localhost:8080/search".to_string();
        assert_eq!(s.searxng_search_endpoint(), "http://localhost:8080/search");
    }

    // One test body: `from_env` reads many variables, and parallel test
    // threads mutating the environment would race each other.
    #[test]
    fn from_env_reads_overrides_and_rejects_garbage() {
        {
            let _g = EnvGuard::set("SEARXPIPE_MAX_RETRIES", "many");
            assert!(matches!(Settings::from_env(), Err(Error::Config(_))));
        }
        {
            let _g = EnvGuard::set("SEARXPIPE_RETRY_DELAY", "0.5");
            let s = Settings::from_env().unwrap();
            assert_eq!(s.retry_delay, Duration::from_millis(500));
        }
        {
            // Finite but beyond Duration's range: a config error, not a panic.
            let _g = EnvGuard::set("SEARXPIPE_RETRY_DELAY", "1e300");
            assert!(matches!(Settings::from_env(), Err(Error::Config(_))));
        }
        {
            let _g = EnvGuard::set("SEARXPIPE_RETRY_DELAY", "-1");
            assert!(matches!(Settings::from_env(), Err(Error::Config(_))));
        }
        {
            let _g1 = EnvGuard::set("SEARXPIPE_MAX_CONTENT_LENGTH", "256");
            let _g2 = EnvGuard::set("SEARXPIPE_SEARXNG_URL", "http://searx.internal:8888");
            let s = Settings::from_env().unwrap();
            assert_eq!(s.max_content_length, 256);
            assert_eq!(s.searxng_url, "http://searx.internal:8888");
        }
    }
}
