use serde::{Deserialize, Serialize};

pub mod settings;

pub use settings::Settings;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    #[error("search failed: {0}")]
    Search(String),
    #[error("browser session failed: {0}")]
    Session(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether a retry can reasonably change the outcome.
    ///
    /// Timeouts, connection resets, 5xx responses and dead browser sessions
    /// are transient; 4xx responses, malformed URLs and unparseable payloads
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Connect(_) | Error::Session(_) => true,
            Error::HttpStatus(status) => *status >= 500,
            Error::InvalidUrl(_) | Error::Search(_) | Error::Extraction(_) | Error::Config(_) => {
                false
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn default_num_results() -> usize {
    5
}

fn default_wait_time() -> u64 {
    3
}

/// One search request item. `num_results` is clamped before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_num_results")]
    pub num_results: usize,
}

impl QueryConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            num_results: default_num_results(),
        }
    }

    /// Effective result count: `[1, max]`.
    pub fn clamped_num_results(&self, max: usize) -> usize {
        self.num_results.clamp(1, max.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMethod {
    #[default]
    Requests,
    Browser,
}

impl ScrapeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeMethod::Requests => "requests",
            ScrapeMethod::Browser => "browser",
        }
    }
}

impl std::fmt::Display for ScrapeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scrape request item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub url: String,
    #[serde(default)]
    pub method: ScrapeMethod,
    /// Seconds to wait for dynamic content (browser method only).
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,
}

impl ScrapeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: ScrapeMethod::default(),
            wait_time: default_wait_time(),
        }
    }

    /// Effective dynamic-content wait: `[0, 30]` seconds.
    pub fn clamped_wait_time(&self) -> u64 {
        self.wait_time.min(30)
    }

    /// The URL must be absolute; anything else is a permanent error.
    pub fn parsed_url(&self) -> Result<url::Url> {
        url::Url::parse(self.url.trim()).map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.url)))
    }

    /// Stable result key: `{index}_{url}_{method}`.
    pub fn result_key(&self, index: usize) -> String {
        format!("{index}_{}_{}", self.url, self.method)
    }
}

/// One normalized engine hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Per-query record: success or error, never absent from the batch mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub status: String,
    pub count: usize,
    pub results: Vec<SearchResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn success(results: Vec<SearchResultItem>) -> Self {
        Self {
            status: "success".to_string(),
            count: results.len(),
            results,
            error: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            status: "error".to_string(),
            count: 0,
            results: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Per-page record produced by the scrape orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub status: String,
    pub method: ScrapeMethod,
    pub title: String,
    pub content: String,
    /// Chars in `content` after truncation.
    pub length: usize,
    /// Chars in the extracted text before truncation.
    pub original_length: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeOutcome {
    pub fn failure(method: ScrapeMethod, error: impl std::fmt::Display) -> Self {
        Self {
            status: "error".to_string(),
            method,
            title: String::new(),
            content: String::new(),
            length: 0,
            original_length: 0,
            truncated: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_results_clamps_to_bounds() {
        let mut q = QueryConfig::new("rust");
        q.num_results = 0;
        assert_eq!(q.clamped_num_results(50), 1);
        q.num_results = 1000;
        assert_eq!(q.clamped_num_results(50), 50);
        q.num_results = 7;
        assert_eq!(q.clamped_num_results(50), 7);
    }

    #[test]
    fn wait_time_clamps_to_bounds() {
        let mut c = ScrapeConfig::new("https://example.com");
        c.wait_time = 300;
        assert_eq!(c.clamped_wait_time(), 30);
        c.wait_time = 0;
        assert_eq!(c.clamped_wait_time(), 0);
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Timeout("t".into()).is_transient());
        assert!(Error::Connect("c".into()).is_transient());
        assert!(Error::Session("s".into()).is_transient());
        assert!(Error::HttpStatus(503).is_transient());
        assert!(!Error::HttpStatus(404).is_transient());
        assert!(!Error::InvalidUrl("u".into()).is_transient());
        assert!(!Error::Search("bad json".into()).is_transient());
    }

    #[test]
    fn relative_urls_are_rejected() {
        let c = ScrapeConfig::new("/relative/path");
        assert!(matches!(c.parsed_url(), Err(Error::InvalidUrl(_))));
        let c = ScrapeConfig::new("https://example.com/page");
        assert!(c.parsed_url().is_ok());
    }

    #[test]
    fn result_key_includes_index_url_method() {
        let mut c = ScrapeConfig::new("https://example.com");
        assert_eq!(c.result_key(0), "0_https://example.com_requests");
        c.method = ScrapeMethod::Browser;
        assert_eq!(c.result_key(2), "2_https://example.com_browser");
    }

    #[test]
    fn scrape_config_defaults_from_json() {
        let c: ScrapeConfig = serde_json::from_str(r#"{"url":"https://example.com"}"#).unwrap();
        assert_eq!(c.method, ScrapeMethod::Requests);
        assert_eq!(c.wait_time, 3);
        let c: ScrapeConfig =
            serde_json::from_str(r#"{"url":"https://example.com","method":"browser"}"#).unwrap();
        assert_eq!(c.method, ScrapeMethod::Browser);
    }
}
