use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use searxpipe_core::{settings::USER_AGENT, Error, Result, Settings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A running Chromium process plus its CDP event-handler task.
///
/// The handler task must be aborted when the handle goes away, otherwise it
/// outlives the browser process.
pub struct BrowserHandle {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserHandle {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Owner of the process-wide shared browser instance.
///
/// The instance is launched lazily on first use, health-checked before every
/// reuse, recreated after a detected crash, and closed once on shutdown.
/// Lifecycle transitions are serialized behind one async mutex; page
/// navigation happens outside the lock, so concurrent scrapes each get their
/// own page inside the shared instance.
#[derive(Clone)]
pub struct BrowserManager {
    settings: Arc<Settings>,
    slot: Arc<Mutex<Option<BrowserHandle>>>,
    launches: Arc<AtomicU64>,
}

impl BrowserManager {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            slot: Arc::new(Mutex::new(None)),
            launches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// How many times a browser process has been launched. Stays at 1 across
    /// healthy sequential scrapes; increments only after crash recovery.
    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    async fn launch(&self) -> Result<BrowserHandle> {
        let config = BrowserConfig::builder()
            .request_timeout(self.settings.browser_timeout)
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .build()
            .map_err(Error::Session)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Session(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler event error");
                }
            }
        });

        self.launches.fetch_add(1, Ordering::SeqCst);
        tracing::info!("browser launched");
        Ok(BrowserHandle {
            browser,
            handler: handler_task,
        })
    }

    /// Open a fresh page in the shared instance, launching or recreating the
    /// browser first when needed. Launch failures are session errors; the
    /// next call retries the launch.
    pub async fn new_page(&self) -> Result<Page> {
        let mut guard = self.slot.lock().await;

        // Health check before reuse: a crashed process stops answering CDP.
        if let Some(handle) = guard.as_ref() {
            if let Err(e) = handle.browser().version().await {
                tracing::warn!(error = %e, "browser health check failed, recreating");
                if let Some(mut dead) = guard.take() {
                    let _ = dead.browser_mut().close().await;
                    let _ = dead.browser_mut().wait().await;
                }
            }
        }

        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let Some(handle) = guard.as_ref() else {
            return Err(Error::Session("browser slot empty after launch".to_string()));
        };

        handle
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Session(format!("failed to open page: {e}")))
    }

    /// Close the shared instance if running. Safe to call repeatedly; later
    /// calls are no-ops. Always invoked on the server exit path.
    pub async fn shutdown(&self) {
        let mut guard = self.slot.lock().await;
        if let Some(mut handle) = guard.take() {
            tracing::info!("shutting down browser");
            if let Err(e) = handle.browser_mut().close().await {
                tracing::warn!(error = %e, "browser close failed");
            }
            if let Err(e) = handle.browser_mut().wait().await {
                tracing::warn!(error = %e, "browser wait failed");
            }
        }
    }
}
