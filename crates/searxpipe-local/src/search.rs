use crate::retry::{with_retry, RetryPolicy};
use crate::BATCH_CONCURRENCY;
use futures::StreamExt;
use searxpipe_core::{
    settings::USER_AGENT, Error, QueryConfig, Result, SearchOutcome, SearchResultItem, Settings,
};
use serde::Deserialize;
use std::sync::Arc;

/// Map a transport-level reqwest failure onto the retry taxonomy.
pub(crate) fn classify_fetch_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_connect() {
        Error::Connect(e.to_string())
    } else if e.is_decode() || e.is_builder() {
        Error::Search(e.to_string())
    } else {
        // Mid-body resets and other request failures without a status are
        // worth a retry.
        Error::Connect(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

/// Client for one SearXNG instance's JSON search API.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    settings: Arc<Settings>,
}

impl SearchClient {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Search(e.to_string()))?;
        Ok(Self { client, settings })
    }

    /// With a caller-provided reqwest client (shared connection pools).
    pub fn with_client(client: reqwest::Client, settings: Arc<Settings>) -> Self {
        Self { client, settings }
    }

    async fn attempt(&self, query: &str, num_results: usize) -> Result<Vec<SearchResultItem>> {
        let resp = self
            .client
            .get(self.settings.searxng_search_endpoint())
            .query(&[("q", query), ("format", "json")])
            // Self-hosted SearXNG instances bot-filter by default; present as
            // a local browser client.
            .header("X-Forwarded-For", "127.0.0.1")
            .header("X-Real-IP", "127.0.0.1")
            .timeout(self.settings.requests_timeout)
            .send()
            .await
            .map_err(classify_fetch_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(format!("invalid JSON from SearXNG: {e}")))?;

        let mut out = Vec::new();
        if let Some(results) = parsed.results {
            for r in results.into_iter().take(num_results) {
                let Some(url) = r.url else { continue };
                out.push(SearchResultItem {
                    title: r.title.unwrap_or_default(),
                    url,
                    content: r.content.unwrap_or_default(),
                });
            }
        }
        Ok(out)
    }

    /// One query against the engine, retried on transient failures. Always
    /// resolves to an outcome record; errors carry the cause, never panic or
    /// abort siblings.
    pub async fn search(&self, config: &QueryConfig) -> SearchOutcome {
        let query = config.query.trim();
        if query.is_empty() {
            return SearchOutcome::failure("query field is required");
        }
        let num_results = config.clamped_num_results(self.settings.max_num_results);
        let policy = RetryPolicy::from_settings(&self.settings);

        match with_retry(policy, || self.attempt(query, num_results)).await {
            Ok(results) => {
                tracing::debug!(query, count = results.len(), "search ok");
                SearchOutcome::success(results)
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "search failed");
                SearchOutcome::failure(e)
            }
        }
    }

    /// Batch of independent queries: an ordered mapping from each query to
    /// its own outcome. A config without a query maps to `<missing_query>`.
    pub async fn search_web(&self, configs: &[QueryConfig]) -> Vec<(String, SearchOutcome)> {
        let futures: Vec<_> = configs
            .iter()
            .map(|config| async move {
                let key = if config.query.trim().is_empty() {
                    "<missing_query>".to_string()
                } else {
                    config.query.clone()
                };
                (key, self.search(config).await)
            })
            .collect();
        futures::stream::iter(futures)
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await
    }
}
