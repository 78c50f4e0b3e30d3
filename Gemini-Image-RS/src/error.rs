use thiserror::Error;

/// Errors returned by a single generation attempt.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// The service returned a non-success HTTP status.
    #[error("Gemini returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response carried no candidates at all.
    #[error("No candidates in response")]
    NoCandidates,

    /// Candidates were present but none had inline image data.
    #[error("No image content in response")]
    NoContent,

    /// The prompt or the output was blocked by the safety filter.
    #[error("Blocked by safety filter: {0}")]
    SafetyBlocked(String),

    /// The attempt did not finish in time.
    #[error("Generation timed out")]
    Timeout,

    /// The request itself is malformed. Never worth retrying.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Inline image data could not be decoded.
    #[error("Failed to decode image data: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Safety blocks count as retryable: the classifier is not deterministic
    /// and a rerun of the same prompt often passes.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Network { .. }
            | GenerationError::Timeout
            | GenerationError::NoCandidates
            | GenerationError::NoContent
            | GenerationError::SafetyBlocked(_) => true,
            GenerationError::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            GenerationError::InvalidRequest(_)
            | GenerationError::Decode(_)
            | GenerationError::Json(_) => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for GenerationError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GenerationError::Timeout
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GenerationError>;
