//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine error: {0}")]
    Engine(#[from] scast_engine::EngineError),

    #[error("Provider error: {0}")]
    Provider(#[from] scast_heygen::HeyGenError),

    #[error("Store error: {0}")]
    Store(#[from] scast_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] scast_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] scast_queue::QueueError),
}

impl WorkerError {
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Engine(e) => e.is_retryable(),
            WorkerError::Provider(e) => e.is_retryable(),
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Storage(_) | WorkerError::Queue(_) => true,
            WorkerError::TaskFailed(_) | WorkerError::ConfigError(_) => false,
        }
    }
}
