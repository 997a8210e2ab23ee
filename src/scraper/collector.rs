use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Automation, CandidateEntry};
use crate::config::ScrapingConfig;

/// Why candidate discovery stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionOutcome {
    /// At least the requested number of entries was loaded
    TargetReached,
    /// A scroll revealed no new entries
    Stalled,
    /// The scroll budget ran out while the feed was still growing
    #[serde(rename = "partial_results")]
    BudgetExhausted,
}

impl std::fmt::Display for CollectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionOutcome::TargetReached => write!(f, "target_reached"),
            CollectionOutcome::Stalled => write!(f, "stalled"),
            CollectionOutcome::BudgetExhausted => write!(f, "partial_results"),
        }
    }
}

/// Candidates discovered in feed order, at most the requested count
#[derive(Debug, Clone)]
pub struct Collection {
    pub candidates: Vec<CandidateEntry>,
    pub outcome: CollectionOutcome,
    pub iterations: usize,
}

/// Scrolls the results feed until enough entries are loaded or it stops growing
pub struct ResultCollector<'a> {
    automation: &'a dyn Automation,
    config: &'a ScrapingConfig,
}

impl<'a> ResultCollector<'a> {
    pub fn new(automation: &'a dyn Automation, config: &'a ScrapingConfig) -> Self {
        Self { automation, config }
    }

    pub async fn collect(&self, requested: usize) -> Result<Collection> {
        let selectors = &self.config.selectors;
        let budget = self.config.max_scroll_iterations;

        let mut previously_counted = 0;
        let mut loaded = 0;

        for iteration in 1..=budget {
            self.automation
                .scroll_to_bottom(&selectors.feed)
                .await
                .context("Failed to scroll results feed")?;
            tokio::time::sleep(self.config.scroll_settle()).await;

            loaded = self
                .automation
                .count_matches(&selectors.feed_entry)
                .await
                .context("Failed to count feed entries")?;
            debug!("Scroll {}: {} entries loaded", iteration, loaded);

            if loaded >= requested {
                return Ok(self.finish(requested, CollectionOutcome::TargetReached, iteration));
            }

            if loaded == previously_counted {
                warn!("No more results found. Got {} places.", loaded);
                return Ok(self.finish(loaded, CollectionOutcome::Stalled, iteration));
            }

            previously_counted = loaded;
            info!("Found {} places so far...", loaded);
        }

        warn!("Scroll budget of {} iterations exhausted with {} places", budget, loaded);
        Ok(self.finish(loaded.min(requested), CollectionOutcome::BudgetExhausted, budget))
    }

    fn finish(&self, count: usize, outcome: CollectionOutcome, iterations: usize) -> Collection {
        let feed_entry = &self.config.selectors.feed_entry;
        Collection {
            candidates: (0..count).map(|index| CandidateEntry::new(feed_entry, index)).collect(),
            outcome,
            iterations,
        }
    }
}
