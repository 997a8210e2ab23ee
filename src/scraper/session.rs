use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Automation, AutomationLauncher};
use crate::config::ScrapingConfig;
use crate::error::PlaceScrapeError;

/// One exclusive browser page for one job.
///
/// Call [`BrowserSession::close`] on every path. If the session is dropped
/// without it (early return, panic unwinding through the job) the page is
/// closed from a background task instead.
pub struct BrowserSession {
    automation: Arc<dyn Automation>,
    config: ScrapingConfig,
    closed: bool,
}

impl BrowserSession {
    /// Launch a fresh browser page
    pub async fn open(launcher: &dyn AutomationLauncher, config: &ScrapingConfig) -> Result<Self> {
        debug!("Opening browser session");

        let automation = launcher
            .launch()
            .await
            .map_err(|e| session_error("launch browser", e))?;

        Ok(Self {
            automation: Arc::from(automation),
            config: config.clone(),
            closed: false,
        })
    }

    pub fn automation(&self) -> &dyn Automation {
        self.automation.as_ref()
    }

    /// Open the search front-end, submit `query` and wait for the results feed
    pub async fn search(&self, query: &str) -> Result<()> {
        let config = &self.config;
        let selectors = &config.selectors;

        info!("Searching for: {}", query);

        self.automation
            .navigate(&config.search_url, config.navigation_timeout())
            .await
            .map_err(|e| session_error("navigate to search page", e))?;
        tokio::time::sleep(config.page_load_settle()).await;

        self.automation
            .fill(&selectors.search_box, query)
            .await
            .map_err(|e| session_error("enter search query", e))?;
        self.automation
            .press_key("Enter")
            .await
            .map_err(|e| session_error("submit search query", e))?;
        tokio::time::sleep(config.search_settle()).await;

        self.automation
            .wait_for_selector(&selectors.feed, config.selector_timeout())
            .await
            .map_err(|e| session_error("wait for results feed", e))?;

        debug!("Results feed is visible");
        Ok(())
    }

    /// Release the page and its browser
    pub async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.automation.close().await {
            warn!("Failed to close browser: {}", e);
        }
        debug!("Browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let automation = self.automation.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Browser session dropped without close, releasing in background");
                handle.spawn(async move {
                    if let Err(e) = automation.close().await {
                        warn!("Failed to close browser: {}", e);
                    }
                });
            }
            Err(_) => warn!("Browser session dropped outside a runtime, page left open"),
        }
    }
}

fn session_error(action: &str, error: anyhow::Error) -> anyhow::Error {
    PlaceScrapeError::session(format!("Failed to {}: {:#}", action, error)).into()
}
