use crate::browser::BrowserManager;
use crate::extract::{extract, truncate_chars};
use crate::retry::{with_retry, RetryPolicy};
use crate::search::classify_fetch_error;
use crate::BATCH_CONCURRENCY;
use futures::StreamExt;
use searxpipe_core::{
    settings::USER_AGENT, Error, Result, ScrapeConfig, ScrapeMethod, ScrapeOutcome, Settings,
};
use std::sync::Arc;
use std::time::Duration;

/// Dispatches each scrape to a plain HTTP fetch or the shared browser,
/// then runs extraction and truncation. Failures stay per-item.
#[derive(Clone)]
pub struct ScrapeOrchestrator {
    client: reqwest::Client,
    browser: BrowserManager,
    settings: Arc<Settings>,
}

impl ScrapeOrchestrator {
    pub fn new(settings: Arc<Settings>, browser: BrowserManager) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Connect(e.to_string()))?;
        Ok(Self {
            client,
            browser,
            settings,
        })
    }

    /// With a caller-provided reqwest client (shared connection pools).
    pub fn with_client(
        client: reqwest::Client,
        settings: Arc<Settings>,
        browser: BrowserManager,
    ) -> Self {
        Self {
            client,
            browser,
            settings,
        }
    }

    async fn fetch_requests(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(self.settings.requests_timeout)
            .send()
            .await
            .map_err(classify_fetch_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }
        resp.text().await.map_err(classify_fetch_error)
    }

    /// One retryable browser unit: open page, navigate, wait for dynamic
    /// content, read rendered HTML. The whole unit shares one wall clock;
    /// the page is closed on every path, the shared instance never is.
    async fn fetch_browser(&self, url: &str, wait_time: u64) -> Result<String> {
        let page = self.browser.new_page().await?;

        let nav = async {
            page.goto(url)
                .await
                .map_err(|e| Error::Session(format!("navigation failed: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| Error::Session(format!("load wait failed: {e}")))?;
            if wait_time > 0 {
                tokio::time::sleep(Duration::from_secs(wait_time)).await;
            }
            page.content()
                .await
                .map_err(|e| Error::Session(format!("could not read page content: {e}")))
        };

        let deadline = browser_deadline(&self.settings, wait_time);
        let html = match tokio::time::timeout(deadline, nav).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "browser timeout after {}ms",
                deadline.as_millis()
            ))),
        };

        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "page close failed");
        }
        html
    }

    /// Scrape one page. Always resolves to an outcome record; unrecoverable
    /// failures become `status=error` with empty content fields.
    pub async fn scrape(&self, config: &ScrapeConfig) -> ScrapeOutcome {
        if let Err(e) = config.parsed_url() {
            return ScrapeOutcome::failure(config.method, e);
        }
        let policy = RetryPolicy::from_settings(&self.settings);

        let fetched = match config.method {
            ScrapeMethod::Requests => {
                with_retry(policy, || self.fetch_requests(&config.url)).await
            }
            ScrapeMethod::Browser => {
                let wait_time = config.clamped_wait_time();
                with_retry(policy, || self.fetch_browser(&config.url, wait_time)).await
            }
        };

        match fetched {
            Ok(html) => page_outcome(&self.settings, config.method, &html),
            Err(e) => {
                tracing::warn!(url = %config.url, method = %config.method, error = %e, "scrape failed");
                ScrapeOutcome::failure(config.method, e)
            }
        }
    }

    /// Batch of independent scrapes: an ordered mapping keyed
    /// `{index}_{url}_{method}`, one entry per config.
    pub async fn scrape_pages(&self, configs: &[ScrapeConfig]) -> Vec<(String, ScrapeOutcome)> {
        let futures: Vec<_> = configs
            .iter()
            .enumerate()
            .map(|(index, config)| async move {
                (config.result_key(index), self.scrape(config).await)
            })
            .collect();
        futures::stream::iter(futures)
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await
    }
}

/// Wall clock for one browser unit. The dynamic-content sleep is
/// caller-requested time on top of the navigation budget; it must never eat
/// into it, or a maximal `wait_time` would time out every page.
fn browser_deadline(settings: &Settings, wait_time: u64) -> Duration {
    settings.browser_timeout + Duration::from_secs(wait_time)
}

/// Extraction plus truncation into a success record. Empty extracted text is
/// still a success.
pub(crate) fn page_outcome(settings: &Settings, method: ScrapeMethod, html: &str) -> ScrapeOutcome {
    let extracted = extract(html);
    let original_length = extracted.text.chars().count();
    let (content, length, truncated) = truncate_chars(&extracted.text, settings.max_content_length);
    ScrapeOutcome {
        status: "success".to_string(),
        method,
        title: extracted.title,
        content,
        length,
        original_length,
        truncated,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_cap(max_content_length: usize) -> Settings {
        Settings {
            max_content_length,
            ..Settings::default()
        }
    }

    #[test]
    fn maximal_wait_time_leaves_the_navigation_budget_intact() {
        // With the default 30s navigation budget, a 30s dynamic-content wait
        // must not consume it: the wall clock covers both.
        let settings = Settings::default();
        let deadline = browser_deadline(&settings, 30);
        assert_eq!(
            deadline,
            settings.browser_timeout + Duration::from_secs(30)
        );
        assert!(deadline > Duration::from_secs(30));

        // No extra allowance when there is no wait.
        assert_eq!(browser_deadline(&settings, 0), settings.browser_timeout);
    }

    #[test]
    fn long_text_is_truncated_with_original_length() {
        let settings = settings_with_cap(10);
        let body: String = "a".repeat(25);
        let html = format!("<html><body>{body}</body></html>");
        let out = page_outcome(&settings, ScrapeMethod::Requests, &html);
        assert_eq!(out.status, "success");
        assert_eq!(out.length, 10);
        assert_eq!(out.original_length, 25);
        assert!(out.truncated);
        assert_eq!(out.content.chars().count(), 10);
    }

    #[test]
    fn short_text_is_untouched() {
        let settings = settings_with_cap(10_000);
        let out = page_outcome(
            &settings,
            ScrapeMethod::Requests,
            "<html><title>T</title><body>hello</body></html>",
        );
        assert_eq!(out.status, "success");
        assert!(!out.truncated);
        assert_eq!(out.length, out.original_length);
        assert_eq!(out.title, "T");
    }

    #[test]
    fn textless_page_is_success_with_empty_content() {
        let settings = settings_with_cap(10_000);
        let out = page_outcome(
            &settings,
            ScrapeMethod::Browser,
            "<html><body><script>x()</script></body></html>",
        );
        assert_eq!(out.status, "success");
        assert_eq!(out.content, "");
        assert_eq!(out.length, 0);
        assert_eq!(out.original_length, 0);
        assert!(!out.truncated);
    }

    proptest::proptest! {
        #[test]
        fn truncation_invariants(body in "[a-z ]{0,200}", cap in 1usize..64) {
            let settings = settings_with_cap(cap);
            let html = format!("<html><body>{body}</body></html>");
            let out = page_outcome(&settings, ScrapeMethod::Requests, &html);
            proptest::prop_assert!(out.length <= cap);
            proptest::prop_assert_eq!(out.length, out.content.chars().count());
            proptest::prop_assert_eq!(out.truncated, out.original_length > cap);
            if !out.truncated {
                proptest::prop_assert_eq!(out.length, out.original_length);
            }
        }
    }
}
