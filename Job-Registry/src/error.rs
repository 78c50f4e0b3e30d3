use thiserror::Error;

/// Errors from the job registry.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The concurrent-run cap is reached; the job was not created.
    #[error("Too many concurrent jobs: {running} running (max {max})")]
    Capacity { running: u32, max: u32 },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Other(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
