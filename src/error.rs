use thiserror::Error;

/// Error types surfaced by the job service and its collaborators
#[derive(Error, Debug)]
pub enum PlaceScrapeError {
    // Submission errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Job queue full")]
    QueueFull,

    // Lookup errors
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Job {job_id} not completed yet (status: {status})")]
    NotReady { job_id: String, status: String },

    #[error("Results not found for job: {job_id}")]
    ResultsMissing { job_id: String },

    // Browser errors
    #[error("Browser session error: {message}")]
    Session { message: String },

    #[error("Failed to extract record {index}: {message}")]
    RecordExtraction { index: usize, message: String },

    // Storage and export errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlaceScrapeError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a not-found error for a job id
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound { job_id: job_id.into() }
    }

    /// Create a browser session error
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session { message: message.into() }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export { message: message.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Errors caused by the caller's request rather than by the service
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::QueueFull
                | Self::JobNotFound { .. }
                | Self::NotReady { .. }
                | Self::ResultsMissing { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::QueueFull => "submission",
            Self::JobNotFound { .. } | Self::NotReady { .. } | Self::ResultsMissing { .. } => "lookup",
            Self::Session { .. } => "session",
            Self::RecordExtraction { .. } => "extraction",
            Self::Storage { .. } => "storage",
            Self::Export { .. } => "export",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for the job service
pub type PlaceScrapeResult<T> = std::result::Result<T, PlaceScrapeError>;

/// Convert anyhow::Error to PlaceScrapeError, keeping a typed error if one is wrapped
impl From<anyhow::Error> for PlaceScrapeError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PlaceScrapeError>() {
            Ok(typed) => typed,
            Err(other) => Self::Internal { message: format!("{:#}", other) },
        }
    }
}
