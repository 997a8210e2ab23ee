//! Scripted in-memory automation used by the pipeline tests.
//!
//! The fake models a results feed that reveals `page_size` more entries per
//! scroll until its listings run out, plus a detail pane per listing.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{Automation, AutomationLauncher};
use crate::config::SelectorConfig;

/// Detail pane content of one listing, keyed by selector
#[derive(Debug, Clone, Default)]
pub struct FakePlace {
    texts: HashMap<String, String>,
    attributes: HashMap<(String, String), String>,
}

impl FakePlace {
    /// A listing with every field populated
    pub fn listing(index: usize) -> Self {
        let selectors = SelectorConfig::default();
        let mut place = Self::default()
            .with_text(&selectors.name, &format!("Place {}", index))
            .with_text(&selectors.address, &format!("{} Rue de la Paix, Paris", index + 1))
            .with_text(&selectors.phone_number, &format!("01 23 45 67 {:02}", index % 100))
            .with_text(&selectors.rating, &format!("4.{}\n({},{:03})", index % 10, 1 + index, index))
            .with_text(&selectors.place_type, "Restaurant")
            .with_text(&selectors.opens_at, "Opens 9 AM")
            .with_text(&selectors.introduction, "Cosy neighbourhood spot");
        place.attributes.insert(
            (selectors.website.clone(), selectors.website_attribute.clone()),
            format!("https://place-{}.example.com/", index),
        );
        place
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn without_text(mut self, selector: &str) -> Self {
        self.texts.remove(selector);
        self
    }
}

/// Behaviour of the fake site shared by every session it launches
#[derive(Debug, Clone)]
pub struct FakeSite {
    pub selectors: SelectorConfig,
    pub places: Vec<FakePlace>,
    pub page_size: usize,
    pub fail_launch: bool,
    pub fail_navigation: bool,
    pub missing_feed: bool,
    pub panic_on_scroll: bool,
    pub failing_clicks: HashSet<usize>,
    pub failing_selectors: HashSet<String>,
    /// Queries the search box refuses
    pub failing_queries: HashSet<String>,
    /// When set, navigation waits for a permit before proceeding
    pub gate: Option<Arc<Semaphore>>,
    /// Extra latency added to every scroll
    pub scroll_latency: Duration,
}

impl FakeSite {
    pub fn with_listings(count: usize, page_size: usize) -> Self {
        Self {
            selectors: SelectorConfig::default(),
            places: (0..count).map(FakePlace::listing).collect(),
            page_size,
            fail_launch: false,
            fail_navigation: false,
            missing_feed: false,
            panic_on_scroll: false,
            failing_clicks: HashSet::new(),
            failing_selectors: HashSet::new(),
            failing_queries: HashSet::new(),
            gate: None,
            scroll_latency: Duration::ZERO,
        }
    }
}

/// Counters observed by tests after a run
#[derive(Debug, Default)]
pub struct FakeStats {
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub clicks: Mutex<Vec<usize>>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeStats {
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> Vec<usize> {
        self.clicks.lock().unwrap().clone()
    }
}

pub struct FakeLauncher {
    site: Arc<FakeSite>,
    pub stats: Arc<FakeStats>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            stats: Arc::new(FakeStats::default()),
        }
    }
}

#[async_trait]
impl AutomationLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn Automation>> {
        if self.site.fail_launch {
            return Err(anyhow!("Failed to launch browser: executable not found"));
        }

        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(FakeAutomation::new(self.site.clone(), self.stats.clone())))
    }
}

#[derive(Debug, Default)]
struct FakePage {
    filled: Option<String>,
    searched: bool,
    loaded: usize,
    selected: Option<usize>,
}

pub struct FakeAutomation {
    site: Arc<FakeSite>,
    stats: Arc<FakeStats>,
    page: Mutex<FakePage>,
}

impl FakeAutomation {
    pub fn new(site: Arc<FakeSite>, stats: Arc<FakeStats>) -> Self {
        Self {
            site,
            stats,
            page: Mutex::new(FakePage::default()),
        }
    }

    fn selected_place(&self) -> Option<FakePlace> {
        let page = self.page.lock().unwrap();
        page.selected.and_then(|index| self.site.places.get(index).cloned())
    }

    fn check_readable(&self, selector: &str) -> Result<()> {
        if self.site.failing_selectors.contains(selector) {
            return Err(anyhow!("Timeout exceeded waiting for {}", selector));
        }
        Ok(())
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        if let Some(gate) = &self.site.gate {
            gate.acquire().await?.forget();
        }
        if self.site.fail_navigation {
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url));
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        if selector != self.site.selectors.search_box {
            return Err(anyhow!("No element matches {}", selector));
        }
        if self.site.failing_queries.contains(text) {
            return Err(anyhow!("Element {} is not editable", selector));
        }
        self.page.lock().unwrap().filled = Some(text.to_string());
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut page = self.page.lock().unwrap();
        if key == "Enter" {
            if let Some(query) = page.filled.clone() {
                self.stats.queries.lock().unwrap().push(query);
                page.searched = true;
                page.loaded = self.site.page_size.min(self.site.places.len());
            }
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let searched = self.page.lock().unwrap().searched;
        if selector == self.site.selectors.feed && (self.site.missing_feed || !searched) {
            return Err(anyhow!("Timeout {}ms exceeded waiting for {}", timeout.as_millis(), selector));
        }
        Ok(())
    }

    async fn scroll_to_bottom(&self, selector: &str) -> Result<()> {
        if self.site.panic_on_scroll {
            panic!("renderer crashed while scrolling {}", selector);
        }
        if !self.site.scroll_latency.is_zero() {
            tokio::time::sleep(self.site.scroll_latency).await;
        }

        self.stats.scrolls.fetch_add(1, Ordering::SeqCst);
        if selector == self.site.selectors.feed {
            let mut page = self.page.lock().unwrap();
            page.loaded = (page.loaded + self.site.page_size).min(self.site.places.len());
        }
        Ok(())
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>> {
        self.check_readable(selector)?;
        Ok(self.selected_place().and_then(|place| place.texts.get(selector).cloned()))
    }

    async fn read_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.check_readable(selector)?;
        Ok(self.selected_place().and_then(|place| {
            place.attributes.get(&(selector.to_string(), name.to_string())).cloned()
        }))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let index = selector
            .rsplit_once(" >> nth=")
            .and_then(|(_, index)| index.parse::<usize>().ok())
            .ok_or_else(|| anyhow!("No element matches {}", selector))?;

        let mut page = self.page.lock().unwrap();
        if index >= page.loaded || self.site.failing_clicks.contains(&index) {
            return Err(anyhow!("Element {} is detached from the DOM", selector));
        }
        page.selected = Some(index);
        self.stats.clicks.lock().unwrap().push(index);
        Ok(())
    }

    async fn count_matches(&self, selector: &str) -> Result<usize> {
        let page = self.page.lock().unwrap();
        if selector == self.site.selectors.feed_entry && page.searched {
            Ok(page.loaded)
        } else {
            Ok(0)
        }
    }

    async fn close(&self) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
