use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ScrapingConfig;
use crate::scraper::{
    AutomationLauncher, BrowserSession, CollectionOutcome, Record, RecordExtractor, ResultCollector,
};

/// Records produced by one run and how discovery ended
#[derive(Debug, Clone)]
pub struct ExtractionRun {
    pub records: Vec<Record>,
    pub candidates: usize,
    pub outcome: CollectionOutcome,
}

/// Search, collect and extract for one query inside one browser session
#[derive(Clone)]
pub struct ExtractionPipeline {
    launcher: Arc<dyn AutomationLauncher>,
    config: Arc<ScrapingConfig>,
}

impl ExtractionPipeline {
    pub fn new(launcher: Arc<dyn AutomationLauncher>, config: ScrapingConfig) -> Self {
        Self {
            launcher,
            config: Arc::new(config),
        }
    }

    pub async fn run(&self, query: &str, requested: usize) -> Result<ExtractionRun> {
        let session = BrowserSession::open(self.launcher.as_ref(), &self.config).await?;

        let result = async {
            session.search(query).await?;

            let collection = ResultCollector::new(session.automation(), &self.config)
                .collect(requested)
                .await?;
            info!(
                "Collected {} candidates after {} scrolls ({})",
                collection.candidates.len(),
                collection.iterations,
                collection.outcome
            );

            let records = RecordExtractor::new(session.automation(), &self.config)
                .extract_all(&collection.candidates)
                .await;

            Ok::<ExtractionRun, anyhow::Error>(ExtractionRun {
                records,
                candidates: collection.candidates.len(),
                outcome: collection.outcome,
            })
        }
        .await;

        // Clean up
        session.close().await;
        debug!("Pipeline finished for query: {}", query);

        result
    }
}
