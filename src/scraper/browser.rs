#[cfg(feature = "browser")]
use anyhow::{Context, Result};
#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use playwright::api::{Browser, Page};
#[cfg(feature = "browser")]
use playwright::Playwright;
#[cfg(feature = "browser")]
use std::sync::Arc;
#[cfg(feature = "browser")]
use std::time::Duration;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use super::{Automation, AutomationLauncher};
#[cfg(feature = "browser")]
use crate::config::ScrapingConfig;

/// Launches one Chromium instance per job through Playwright
#[cfg(feature = "browser")]
pub struct PlaywrightLauncher {
    playwright: Arc<Playwright>,
    headless: bool,
}

// Ensure PlaywrightLauncher is Send + Sync
#[cfg(feature = "browser")]
unsafe impl Send for PlaywrightLauncher {}
#[cfg(feature = "browser")]
unsafe impl Sync for PlaywrightLauncher {}

#[cfg(feature = "browser")]
impl PlaywrightLauncher {
    /// Start the Playwright driver and make sure a browser is installed
    pub async fn new(config: &ScrapingConfig) -> Result<Self> {
        debug!("Initializing Playwright driver");

        let playwright = Playwright::initialize()
            .await
            .context("Failed to start Playwright driver")?;
        playwright
            .prepare()
            .context("Failed to install browser binaries")?;

        info!("Playwright ready (headless: {})", config.headless);
        Ok(Self {
            playwright: Arc::new(playwright),
            headless: config.headless,
        })
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl AutomationLauncher for PlaywrightLauncher {
    async fn launch(&self) -> Result<Box<dyn Automation>> {
        let browser = self
            .playwright
            .chromium()
            .launcher()
            .headless(self.headless)
            .launch()
            .await?;

        let page = async {
            let context = browser.context_builder().build().await?;
            let page = context.new_page().await?;
            Ok::<Page, anyhow::Error>(page)
        }
        .await;

        match page {
            Ok(page) => Ok(Box::new(PlaywrightAutomation {
                _playwright: self.playwright.clone(),
                browser,
                page,
            })),
            Err(e) => {
                // Clean up
                let _ = browser.close().await;
                Err(e)
            }
        }
    }
}

/// One page of one dedicated browser
#[cfg(feature = "browser")]
pub struct PlaywrightAutomation {
    _playwright: Arc<Playwright>,
    browser: Browser,
    page: Page,
}

// Ensure PlaywrightAutomation is Send + Sync
#[cfg(feature = "browser")]
unsafe impl Send for PlaywrightAutomation {}
#[cfg(feature = "browser")]
unsafe impl Sync for PlaywrightAutomation {}

#[cfg(feature = "browser")]
fn millis(timeout: Duration) -> f64 {
    timeout.as_millis() as f64
}

#[cfg(feature = "browser")]
#[async_trait]
impl Automation for PlaywrightAutomation {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.page
            .goto_builder(url)
            .timeout(millis(timeout))
            .goto()
            .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.page.fill_builder(selector, text).fill().await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.page.keyboard.press(key, None).await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.page
            .wait_for_selector_builder(selector)
            .timeout(millis(timeout))
            .wait_for_selector()
            .await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.scrollTop = el.scrollHeight; }} }})()",
            serde_json::to_string(selector)?
        );
        self.page.evaluate::<(), ()>(&script, ()).await?;
        Ok(())
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>> {
        match self.page.query_selector(selector).await? {
            Some(element) => Ok(Some(element.inner_text().await?)),
            None => Ok(None),
        }
    }

    async fn read_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        match self.page.query_selector(selector).await? {
            Some(element) => Ok(element.get_attribute(name).await?),
            None => Ok(None),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page.click_builder(selector).click().await?;
        Ok(())
    }

    async fn count_matches(&self, selector: &str) -> Result<usize> {
        Ok(self.page.query_selector_all(selector).await?.len())
    }

    async fn close(&self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

// Stub implementation when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct PlaywrightLauncher;

#[cfg(not(feature = "browser"))]
impl PlaywrightLauncher {
    pub async fn new(_config: &crate::config::ScrapingConfig) -> anyhow::Result<Self> {
        tracing::warn!("Built without the browser feature, every job will fail to launch a browser");
        Ok(Self)
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl super::AutomationLauncher for PlaywrightLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn super::Automation>> {
        Err(anyhow::anyhow!("Browser feature not enabled"))
    }
}
