use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{PlaceScrapeError, PlaceScrapeResult};
use crate::scraper::CollectionOutcome;
use crate::storage::ResultHandle;

pub type JobId = String;

/// Smallest and largest number of records a job may request
pub const MIN_REQUESTED_COUNT: i64 = 1;
pub const MAX_REQUESTED_COUNT: i64 = 100;

/// Job status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Pending -> Running -> Completed | Failed, nothing else
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Job record structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub query: String,
    pub requested_count: usize,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_count: usize,
    pub result_handle: Option<ResultHandle>,
    pub error: Option<String>,
    /// How candidate discovery ended, set on completion
    pub outcome: Option<CollectionOutcome>,
    #[serde(skip)]
    sequence: u64,
}

/// State changes an execution unit may apply to its own job
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Started,
    Completed {
        result_count: usize,
        result_handle: ResultHandle,
        outcome: CollectionOutcome,
    },
    Failed {
        error: String,
    },
}

impl JobUpdate {
    fn target_status(&self) -> JobStatus {
        match self {
            JobUpdate::Started => JobStatus::Running,
            JobUpdate::Completed { .. } => JobStatus::Completed,
            JobUpdate::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Concurrency-safe registry of jobs keyed by id.
///
/// Deleting an unfinished job leaves a tombstone so that a late write from
/// its still-running execution unit cannot bring the job back. The unit
/// clears the tombstone once it has made its last write.
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
    tombstones: DashSet<JobId>,
    counter: AtomicU64,
    max_query_length: usize,
}

impl JobStore {
    pub fn new(max_query_length: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            tombstones: DashSet::new(),
            counter: AtomicU64::new(0),
            max_query_length,
        }
    }

    /// Check a submission without creating anything
    pub fn validate(&self, query: &str, requested_count: i64) -> PlaceScrapeResult<()> {
        if query.trim().is_empty() {
            return Err(PlaceScrapeError::validation("search_query is required"));
        }
        if query.chars().count() > self.max_query_length {
            return Err(PlaceScrapeError::validation(format!(
                "search_query must be at most {} characters",
                self.max_query_length
            )));
        }
        if !(MIN_REQUESTED_COUNT..=MAX_REQUESTED_COUNT).contains(&requested_count) {
            return Err(PlaceScrapeError::validation(format!(
                "total must be between {} and {}",
                MIN_REQUESTED_COUNT, MAX_REQUESTED_COUNT
            )));
        }
        Ok(())
    }

    /// Register a new Pending job and return it as created
    pub fn create(&self, query: &str, requested_count: i64) -> PlaceScrapeResult<Job> {
        self.validate(query, requested_count)?;

        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let created_at = Utc::now();
        let id = format!("job_{}_{}", sequence, created_at.format("%Y%m%d_%H%M%S"));

        let job = Job {
            id: id.clone(),
            query: query.trim().to_string(),
            requested_count: requested_count as usize,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            result_count: 0,
            result_handle: None,
            error: None,
            outcome: None,
            sequence,
        };

        self.jobs.insert(id.clone(), job.clone());
        debug!("Created job {}", id);
        Ok(job)
    }

    pub fn get(&self, id: &str) -> PlaceScrapeResult<Job> {
        self.jobs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlaceScrapeError::job_not_found(id))
    }

    /// Snapshot of every job in creation order
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by_key(|job| job.sequence);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove a job, returning its last state
    pub fn delete(&self, id: &str) -> PlaceScrapeResult<Job> {
        {
            // Holding the entry keeps the status fixed until the tombstone is in place
            let entry = self
                .jobs
                .get(id)
                .ok_or_else(|| PlaceScrapeError::job_not_found(id))?;
            if !entry.status.is_terminal() {
                self.tombstones.insert(id.to_string());
            }
        }

        let (_, job) = self
            .jobs
            .remove(id)
            .ok_or_else(|| PlaceScrapeError::job_not_found(id))?;

        debug!("Deleted job {}", id);
        Ok(job)
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    /// Forget a deleted job once its execution unit will not write again
    pub(crate) fn clear_tombstone(&self, id: &str) {
        if self.tombstones.remove(id).is_some() {
            debug!("Cleared tombstone of job {}", id);
        }
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Apply an update from the job's execution unit.
    ///
    /// Fails with `JobNotFound` once the job is deleted and with `Internal`
    /// on a transition that would break the status order.
    pub(crate) fn write(&self, id: &str, update: JobUpdate) -> PlaceScrapeResult<Job> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| PlaceScrapeError::job_not_found(id))?;
        if self.is_tombstoned(id) {
            return Err(PlaceScrapeError::job_not_found(id));
        }
        let job = entry.value_mut();

        let next = update.target_status();
        if !job.status.can_transition_to(next) {
            return Err(PlaceScrapeError::internal(format!(
                "Illegal status transition for {}: {} -> {}",
                id, job.status, next
            )));
        }

        let now = Utc::now();
        match update {
            JobUpdate::Started => {
                job.started_at = Some(now);
            }
            JobUpdate::Completed {
                result_count,
                result_handle,
                outcome,
            } => {
                job.completed_at = Some(now);
                job.result_count = result_count;
                job.result_handle = Some(result_handle);
                job.outcome = Some(outcome);
            }
            JobUpdate::Failed { error } => {
                job.completed_at = Some(now);
                job.error = Some(error);
            }
        }
        job.status = next;

        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn store() -> JobStore {
        JobStore::new(500)
    }

    #[test]
    fn test_create_assigns_pending_job() {
        let store = store();
        let id = store.create("  tapas Madrid ", 10).unwrap().id;

        assert!(id.starts_with("job_1_"));
        let job = store.get(&id).unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.query, "tapas Madrid");
        assert_eq!(job.requested_count, 10);
        assert_eq!(job.result_count, 0);
        assert!(job.started_at.is_none());
        assert!(job.result_handle.is_none());
    }

    #[test]
    fn test_rejected_submissions_create_nothing() {
        let store = store();

        for (query, count) in [("", 5), ("   ", 5), ("sushi", 0), ("sushi", 101), ("sushi", -3)] {
            let err = store.create(query, count).unwrap_err();
            assert!(matches!(err, PlaceScrapeError::Validation { .. }), "{query:?} {count}");
        }
        let err = store.create(&"x".repeat(501), 5).unwrap_err();
        assert!(matches!(err, PlaceScrapeError::Validation { .. }));

        assert!(store.is_empty());
        // rejected submissions do not consume ids
        assert!(store.create("sushi", 100).unwrap().id.starts_with("job_1_"));
    }

    #[test]
    fn test_validation_messages() {
        let store = store();
        assert_eq!(
            store.validate("", 10).unwrap_err().to_string(),
            "Validation error: search_query is required"
        );
        assert_eq!(
            store.validate("ramen", 0).unwrap_err().to_string(),
            "Validation error: total must be between 1 and 100"
        );
        assert!(store.validate("ramen", 1).is_ok());
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..50).map(|_| store.create("pho", 5).unwrap().id).collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<JobId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_list_is_in_creation_order() {
        let store = store();
        let ids: Vec<JobId> = (0..12).map(|i| store.create(&format!("query {i}"), 5).unwrap().id).collect();

        let listed: Vec<JobId> = store.list().into_iter().map(|job| job.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let store = store();
        let id = store.create("kebab", 3).unwrap().id;

        let job = store.write(&id, JobUpdate::Started).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        let job = store
            .write(
                &id,
                JobUpdate::Completed {
                    result_count: 3,
                    result_handle: ResultHandle::new("memory:x"),
                    outcome: CollectionOutcome::TargetReached,
                },
            )
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_count, 3);
        assert!(job.completed_at.is_some());

        // terminal states are final
        let err = store.write(&id, JobUpdate::Failed { error: "late".to_string() }).unwrap_err();
        assert!(matches!(err, PlaceScrapeError::Internal { .. }));
        let err = store.write(&id, JobUpdate::Started).unwrap_err();
        assert!(matches!(err, PlaceScrapeError::Internal { .. }));
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Completed);
        assert!(store.get(&id).unwrap().error.is_none());
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        let store = store();
        let id = store.create("falafel", 3).unwrap().id;

        assert!(store.write(&id, JobUpdate::Failed { error: "x".to_string() }).is_err());
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_delete_tombstones_job() {
        let store = store();
        let id = store.create("crêpes", 3).unwrap().id;
        store.write(&id, JobUpdate::Started).unwrap();

        let removed = store.delete(&id).unwrap();
        assert_eq!(removed.status, JobStatus::Running);
        assert!(store.is_tombstoned(&id));
        assert!(matches!(store.get(&id), Err(PlaceScrapeError::JobNotFound { .. })));

        // the execution unit finishing later must not resurrect it
        let err = store.write(&id, JobUpdate::Failed { error: "late".to_string() }).unwrap_err();
        assert!(matches!(err, PlaceScrapeError::JobNotFound { .. }));
        assert!(store.get(&id).is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_tombstone_cleared_after_last_write() {
        let store = store();
        let id = store.create("paella", 3).unwrap().id;
        store.write(&id, JobUpdate::Started).unwrap();
        store.delete(&id).unwrap();
        assert_eq!(store.tombstone_count(), 1);

        store.clear_tombstone(&id);
        assert_eq!(store.tombstone_count(), 0);
        assert!(store.get(&id).is_err());
    }

    #[test]
    fn test_deleting_finished_jobs_leaves_no_tombstones() {
        let store = store();
        for _ in 0..1000 {
            let id = store.create("churros", 1).unwrap().id;
            store.write(&id, JobUpdate::Started).unwrap();
            store
                .write(&id, JobUpdate::Failed { error: "gone".to_string() })
                .unwrap();
            store.delete(&id).unwrap();
        }

        assert!(store.is_empty());
        assert_eq!(store.tombstone_count(), 0);
    }

    #[test]
    fn test_unknown_ids() {
        let store = store();
        assert!(matches!(store.get("job_9"), Err(PlaceScrapeError::JobNotFound { .. })));
        assert!(matches!(store.delete("job_9"), Err(PlaceScrapeError::JobNotFound { .. })));
        assert!(matches!(
            store.write("job_9", JobUpdate::Started),
            Err(PlaceScrapeError::JobNotFound { .. })
        ));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(JobStatus::Running).unwrap(), "running");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }
}
