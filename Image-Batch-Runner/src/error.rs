use thiserror::Error;

/// Errors that reject a batch before any work starts.
///
/// Failures of individual images are never reported here; they end up in
/// [`BatchResult::per_task`](crate::BatchResult::per_task).
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch has no prompts")]
    EmptyBatch,

    #[error("Invalid prompt list: {0}")]
    InvalidPrompts(String),

    #[error("Too many {kind} reference images: {count} (max {max})")]
    TooManyReferences {
        kind: &'static str,
        count: usize,
        max: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;
