//! Task types for the queue.

use chrono::{DateTime, Utc};
use scast_models::RenderJobId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task to submit a queued render job to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRenderTask {
    /// Unique task ID
    pub task_id: String,
    /// Render job to submit
    pub job_id: RenderJobId,
    /// When the task was created
    pub created_at: DateTime<Utc>,
}

impl SubmitRenderTask {
    pub fn new(job_id: RenderJobId) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            job_id,
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("submit:{}", self.job_id)
    }
}

/// Task to process a persisted webhook event off the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessWebhookTask {
    /// Unique task ID
    pub task_id: String,
    /// Provider event ID of the persisted webhook record
    pub provider_event_id: String,
    /// When the task was created
    pub created_at: DateTime<Utc>,
}

impl ProcessWebhookTask {
    pub fn new(provider_event_id: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            provider_event_id: provider_event_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("webhook:{}", self.provider_event_id)
    }
}

/// Task to copy a completed render's output into durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRenderTask {
    /// Unique task ID
    pub task_id: String,
    /// Completed render job to archive
    pub job_id: RenderJobId,
    /// When the task was created
    pub created_at: DateTime<Utc>,
}

impl ArchiveRenderTask {
    pub fn new(job_id: RenderJobId) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            job_id,
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("archive:{}", self.job_id)
    }
}

/// All task types that can be enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueTask {
    SubmitRender(SubmitRenderTask),
    ProcessWebhook(ProcessWebhookTask),
    ArchiveRender(ArchiveRenderTask),
}

impl QueueTask {
    /// Get the task ID.
    pub fn task_id(&self) -> &str {
        match self {
            QueueTask::SubmitRender(t) => &t.task_id,
            QueueTask::ProcessWebhook(t) => &t.task_id,
            QueueTask::ArchiveRender(t) => &t.task_id,
        }
    }

    /// Get the idempotency key.
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueTask::SubmitRender(t) => t.idempotency_key(),
            QueueTask::ProcessWebhook(t) => t.idempotency_key(),
            QueueTask::ArchiveRender(t) => t.idempotency_key(),
        }
    }

    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueTask::SubmitRender(_) => "submit_render",
            QueueTask::ProcessWebhook(_) => "process_webhook",
            QueueTask::ArchiveRender(_) => "archive_render",
        }
    }
}
