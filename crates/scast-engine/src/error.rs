//! Engine error types.

use chrono::{DateTime, Utc};
use scast_heygen::HeyGenError;
use scast_models::TransitionError;
use scast_queue::QueueError;
use scast_storage::StorageError;
use scast_store::StoreError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Daily video request quota reached")]
    QuotaExceeded,

    #[error("Video generation is blocked until {until}")]
    QuotaBlocked { until: DateTime<Utc> },

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedWebhookPayload(String),

    #[error("No job matches provider correlation key: {0}")]
    UnknownCorrelation(String),

    #[error("Output download failed: {0}")]
    DownloadFailed(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Webhook event not found: {0}")]
    EventNotFound(String),

    #[error("Live session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    Provider(#[from] HeyGenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn submission_failed(msg: impl Into<String>) -> Self {
        Self::SubmissionFailed(msg.into())
    }

    pub fn malformed_payload(msg: impl Into<String>) -> Self {
        Self::MalformedWebhookPayload(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn invalid_script(msg: impl Into<String>) -> Self {
        Self::InvalidScript(msg.into())
    }

    /// Whether the executor should retry the task, as opposed to
    /// dead-lettering it immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Provider(e) => e.is_retryable(),
            EngineError::Store(e) => e.is_retryable(),
            EngineError::Storage(_) | EngineError::Queue(_) | EngineError::DownloadFailed(_) => {
                true
            }
            _ => false,
        }
    }
}
