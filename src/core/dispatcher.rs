use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::job_store::{Job, JobId, JobStore, JobUpdate};
use super::pipeline::{ExtractionPipeline, ExtractionRun};
use crate::config::JobsConfig;
use crate::error::{PlaceScrapeError, PlaceScrapeResult};
use crate::logging::{LogContext, PerformanceLogger};
use crate::scraper::CollectionOutcome;
use crate::storage::ResultSink;

/// Starts one execution unit per accepted job on a bounded worker pool.
///
/// At most `max_concurrent_jobs` units hold a browser at once; the rest
/// wait in Pending. Submissions beyond `max_queued_jobs` waiting jobs are
/// refused before any job is created.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<JobStore>,
    sink: Arc<dyn ResultSink>,
    pipeline: ExtractionPipeline,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    max_queued_jobs: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        sink: Arc<dyn ResultSink>,
        pipeline: ExtractionPipeline,
        config: &JobsConfig,
    ) -> Self {
        Self {
            store,
            sink,
            pipeline,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            queued: Arc::new(AtomicUsize::new(0)),
            max_queued_jobs: config.max_queued_jobs,
        }
    }

    /// Jobs accepted but still waiting for a worker
    pub fn queued_jobs(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Validate, create a Pending job and start its execution unit.
    ///
    /// Returns the job as created, before its unit has run; must be called
    /// inside a Tokio runtime.
    pub fn submit(&self, query: &str, requested_count: i64) -> PlaceScrapeResult<Job> {
        self.store.validate(query, requested_count)?;

        let max_queued = self.max_queued_jobs;
        let admitted = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                (queued < max_queued).then_some(queued + 1)
            });
        if admitted.is_err() {
            warn!("Rejecting submission, {} jobs already waiting", max_queued);
            return Err(PlaceScrapeError::QueueFull);
        }

        let job = match self.store.create(query, requested_count) {
            Ok(job) => job,
            Err(e) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        let dispatcher = self.clone();
        let unit_job_id = job.id.clone();
        tokio::spawn(async move {
            dispatcher.execute(unit_job_id).await;
        });

        Ok(job)
    }

    /// One execution unit. Never panics and never returns an error.
    async fn execute(self, job_id: JobId) {
        self.run_job(&job_id).await;
        // Nothing writes this id from here on
        self.store.clear_tombstone(&job_id);
    }

    async fn run_job(&self, job_id: &str) {
        let permit = self.permits.clone().acquire_owned().await;
        self.queued.fetch_sub(1, Ordering::SeqCst);

        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Worker pool closed, job {} will not run", job_id);
                return;
            }
        };

        let job = match self.store.write(job_id, JobUpdate::Started) {
            Ok(job) => job,
            Err(e) => {
                debug!("Job {} not started: {}", job_id, e);
                return;
            }
        };

        let context = LogContext::new("dispatcher", "execute_job")
            .with_job_id(job_id)
            .with_query(&job.query)
            .with_number_field("requested_count", job.requested_count as i64);
        crate::log_info!(context, "Starting job");
        let perf_logger = PerformanceLogger::new(context);

        // The pipeline runs as its own task so a panic surfaces as a JoinError
        let pipeline = self.pipeline.clone();
        let query = job.query.clone();
        let requested = job.requested_count;
        let joined = tokio::spawn(async move { pipeline.run(&query, requested).await }).await;

        let result: PlaceScrapeResult<ExtractionRun> = match joined {
            Ok(Ok(run)) => Ok(run),
            Ok(Err(e)) => Err(e.into()),
            Err(join_error) => Err(PlaceScrapeError::internal(describe_join_error(join_error))),
        };

        match result {
            Ok(run) => self.complete(job_id, run, perf_logger).await,
            Err(e) => self.fail(job_id, e, perf_logger),
        }
    }

    async fn complete(&self, job_id: &str, run: ExtractionRun, perf_logger: PerformanceLogger) {
        if self.store.is_tombstoned(job_id) {
            debug!("Job {} deleted while running, discarding {} records", job_id, run.records.len());
            return;
        }

        let handle = match self.sink.write(job_id, &run.records).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(job_id, e.into(), perf_logger);
                return;
            }
        };

        let update = JobUpdate::Completed {
            result_count: run.records.len(),
            result_handle: handle,
            outcome: run.outcome,
        };
        match self.store.write(job_id, update) {
            Ok(job) => {
                let message = format!("Job completed with {} of {} records", job.result_count, job.requested_count);
                if run.outcome == CollectionOutcome::TargetReached {
                    perf_logger.finish_with_status(&message, run.outcome.to_string());
                } else {
                    perf_logger.finish_with_warning(&message, run.outcome.to_string());
                }
            }
            Err(e) => {
                // Deleted in the meantime: drop what was just stored
                debug!("Job {} not marked completed: {}", job_id, e);
                if let Err(e) = self.sink.remove(job_id).await {
                    warn!("Failed to remove results of deleted job {}: {}", job_id, e);
                }
            }
        }
    }

    fn fail(&self, job_id: &str, error: PlaceScrapeError, perf_logger: PerformanceLogger) {
        perf_logger.finish_with_error("Job failed", &error);

        let update = JobUpdate::Failed {
            error: error.to_string(),
        };
        if let Err(e) = self.store.write(job_id, update) {
            debug!("Job {} not marked failed: {}", job_id, e);
        }
    }
}

fn describe_join_error(join_error: tokio::task::JoinError) -> String {
    if join_error.is_cancelled() {
        return "Job execution was cancelled".to_string();
    }

    let payload = join_error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Job execution panicked: {}", message)
}
