//! Store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Lock contention: {0}")]
    LockContention(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        StoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        StoreError::Conflict(msg.into())
    }

    pub fn lock_contention(msg: impl Into<String>) -> Self {
        StoreError::LockContention(msg.into())
    }

    pub fn redis(msg: impl Into<String>) -> Self {
        StoreError::Redis(msg.into())
    }

    /// Whether a retry at the task level could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Redis(_) | StoreError::LockContention(_)
        )
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Redis(e.to_string())
    }
}
