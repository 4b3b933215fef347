//! HeyGen client error types.

use thiserror::Error;

pub type HeyGenResult<T> = Result<T, HeyGenError>;

#[derive(Debug, Error)]
pub enum HeyGenError {
    #[error("HeyGen API key is not configured")]
    MissingApiKey,

    #[error("HeyGen unavailable: {0}")]
    Unavailable(String),

    #[error("HeyGen request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("HeyGen business error (code {code}): {message}")]
    Business { code: i64, message: String },

    #[error("HeyGen returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeyGenError {
    /// Transient failures worth retrying inside the client's own budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HeyGenError::Unavailable(_) | HeyGenError::Network(_))
    }
}
