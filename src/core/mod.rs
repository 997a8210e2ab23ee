use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod dispatcher;
pub mod job_store;
pub mod pipeline;

pub use dispatcher::Dispatcher;
pub use job_store::{Job, JobId, JobStatus, JobStore};
pub use pipeline::{ExtractionPipeline, ExtractionRun};

use crate::config::AppConfig;
use crate::error::{PlaceScrapeError, PlaceScrapeResult};
use crate::export::{self, ExportFormat};
use crate::scraper::{AutomationLauncher, Record};
use crate::storage::{self, ResultSink};

/// Stored records of one completed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub job_id: JobId,
    pub count: usize,
    pub data: Vec<Record>,
}

/// Core application state: job registry, dispatcher and result storage
#[derive(Clone)]
pub struct PlaceScrapeService {
    config: Arc<AppConfig>,
    store: Arc<JobStore>,
    dispatcher: Dispatcher,
    sink: Arc<dyn ResultSink>,
}

impl PlaceScrapeService {
    /// Wire up all subsystems with the sink selected by the configuration
    pub fn new(config: AppConfig, launcher: Arc<dyn AutomationLauncher>) -> PlaceScrapeResult<Self> {
        let sink = storage::create_sink(&config.storage)?;
        Ok(Self::with_sink(config, launcher, sink))
    }

    pub fn with_sink(
        config: AppConfig,
        launcher: Arc<dyn AutomationLauncher>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        info!("Initializing place scrape service");

        let store = Arc::new(JobStore::new(config.jobs.max_query_length));
        let pipeline = ExtractionPipeline::new(launcher, config.scraping.clone());
        let dispatcher = Dispatcher::new(store.clone(), sink.clone(), pipeline, &config.jobs);
        info!(
            "Dispatcher ready ({} concurrent jobs, {} queued)",
            config.jobs.max_concurrent_jobs, config.jobs.max_queued_jobs
        );

        Self {
            config: Arc::new(config),
            store,
            dispatcher,
            sink,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check a submission without creating a job
    pub fn validate_submission(&self, query: &str, requested_count: i64) -> PlaceScrapeResult<()> {
        self.store.validate(query, requested_count)
    }

    /// Accept a job and return its Pending snapshot without waiting for any work
    pub fn submit(&self, query: &str, requested_count: i64) -> PlaceScrapeResult<Job> {
        let job = self.dispatcher.submit(query, requested_count)?;
        info!("Accepted job {} for query: {}", job.id, job.query);
        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> PlaceScrapeResult<Job> {
        self.store.get(job_id)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store.list()
    }

    /// Records of a completed job, in feed order
    pub async fn get_results(&self, job_id: &str) -> PlaceScrapeResult<JobResults> {
        let job = self.store.get(job_id)?;
        if job.status != JobStatus::Completed {
            return Err(PlaceScrapeError::NotReady {
                job_id: job.id,
                status: job.status.to_string(),
            });
        }

        let data = self
            .sink
            .read(job_id)
            .await?
            .ok_or_else(|| PlaceScrapeError::ResultsMissing {
                job_id: job_id.to_string(),
            })?;

        Ok(JobResults {
            job_id: job.id,
            count: data.len(),
            data,
        })
    }

    /// Results of a completed job rendered in `format`
    pub async fn export_results(&self, job_id: &str, format: ExportFormat) -> PlaceScrapeResult<Vec<u8>> {
        let results = self.get_results(job_id).await?;
        Ok(export::export_records(&results.data, format)?)
    }

    /// Remove a job and its stored results
    pub async fn delete_job(&self, job_id: &str) -> PlaceScrapeResult<Job> {
        let job = self.store.delete(job_id)?;

        if let Err(e) = self.sink.remove(job_id).await {
            warn!("Failed to remove results for job {}: {}", job_id, e);
        }

        info!("Deleted job {} ({})", job_id, job.status);
        Ok(job)
    }

    /// Poll until the job reaches a terminal state
    pub async fn wait_for_job(&self, job_id: &str, poll_interval: Duration) -> PlaceScrapeResult<Job> {
        loop {
            let job = self.store.get(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
