use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::PlaceScrapeError;
use crate::scraper::Record;

/// Opaque reference to a stored result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultHandle(String);

impl ResultHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable store for the record set of each completed job.
///
/// A job's results are written once, as a whole, before the job is marked
/// completed. Readers never observe a partially written set.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write(&self, job_id: &str, records: &[Record]) -> Result<ResultHandle>;

    /// `None` when nothing was ever written for `job_id` or it was removed
    async fn read(&self, job_id: &str) -> Result<Option<Vec<Record>>>;

    /// Returns whether anything was removed
    async fn remove(&self, job_id: &str) -> Result<bool>;
}

/// Build the sink selected by the storage configuration
pub fn create_sink(config: &StorageConfig) -> Result<Arc<dyn ResultSink>> {
    match config.backend {
        StorageBackend::File => {
            info!("Storing results under {}", config.results_directory.display());
            Ok(Arc::new(JsonFileSink::new(&config.results_directory)?))
        }
        StorageBackend::Memory => {
            info!("Storing results in memory");
            Ok(Arc::new(MemorySink::new()))
        }
    }
}

/// One JSON array per job in a results directory
pub struct JsonFileSink {
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create results directory {}", directory.display()))?;
        Ok(Self { directory })
    }

    fn path_for(&self, job_id: &str) -> Result<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.directory.join(format!("{}.json", job_id)))
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn write(&self, job_id: &str, records: &[Record]) -> Result<ResultHandle> {
        let path = self.path_for(job_id)?;
        let temp_path = path.with_extension("json.tmp");

        let content = serde_json::to_vec_pretty(records)
            .map_err(|e| PlaceScrapeError::storage(format!("Failed to serialize results: {}", e)))?;

        // Write then rename so readers see either nothing or the full set
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| PlaceScrapeError::storage(format!("Failed to write {}: {}", temp_path.display(), e)))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| PlaceScrapeError::storage(format!("Failed to move results into place: {}", e)))?;

        debug!("Stored {} records at {}", records.len(), path.display());
        Ok(ResultHandle::new(path.to_string_lossy()))
    }

    async fn read(&self, job_id: &str) -> Result<Option<Vec<Record>>> {
        let path = self.path_for(job_id)?;

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PlaceScrapeError::storage(format!("Failed to read {}: {}", path.display(), e)).into())
            }
        };

        let records = serde_json::from_slice(&content)
            .map_err(|e| PlaceScrapeError::storage(format!("Corrupt results file {}: {}", path.display(), e)))?;
        Ok(Some(records))
    }

    async fn remove(&self, job_id: &str) -> Result<bool> {
        let path = self.path_for(job_id)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed results file {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PlaceScrapeError::storage(format!("Failed to remove {}: {}", path.display(), e)).into()),
        }
    }
}

/// Process-local sink, results vanish on restart
#[derive(Default)]
pub struct MemorySink {
    results: DashMap<String, Arc<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write(&self, job_id: &str, records: &[Record]) -> Result<ResultHandle> {
        self.results.insert(job_id.to_string(), Arc::new(records.to_vec()));
        Ok(ResultHandle::new(format!("memory:{}", job_id)))
    }

    async fn read(&self, job_id: &str) -> Result<Option<Vec<Record>>> {
        Ok(self.results.get(job_id).map(|entry| entry.value().as_ref().clone()))
    }

    async fn remove(&self, job_id: &str) -> Result<bool> {
        Ok(self.results.remove(job_id).is_some())
    }
}

/// Job ids become file names, so only a safe character set is accepted
fn validate_job_id(job_id: &str) -> Result<()> {
    let valid = !job_id.is_empty()
        && job_id.len() <= 128
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid {
        return Err(PlaceScrapeError::storage(format!("Invalid job id for storage: {:?}", job_id)).into());
    }
    Ok(())
}
