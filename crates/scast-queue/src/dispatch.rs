//! Task dispatch seam.
//!
//! The engine schedules follow-up work through this trait so it stays
//! testable without Redis. Dispatch is idempotent: a task whose
//! idempotency key was already enqueued is silently dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::queue::TaskQueue;
use crate::task::QueueTask;

/// Something that accepts tasks for asynchronous execution.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, task: QueueTask) -> QueueResult<()>;
}

#[async_trait]
impl TaskDispatcher for TaskQueue {
    async fn dispatch(&self, task: QueueTask) -> QueueResult<()> {
        match self.enqueue(task).await {
            Ok(_) => Ok(()),
            Err(QueueError::Duplicate(key)) => {
                debug!("Task already scheduled: {}", key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// In-memory dispatcher for tests. Collects tasks instead of running them.
#[derive(Clone, Default)]
pub struct MemoryDispatcher {
    tasks: Arc<Mutex<Vec<QueueTask>>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all dispatched tasks in dispatch order.
    pub async fn drain(&self) -> Vec<QueueTask> {
        std::mem::take(&mut *self.tasks.lock().await)
    }

    /// Number of dispatched tasks.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

#[async_trait]
impl TaskDispatcher for MemoryDispatcher {
    async fn dispatch(&self, task: QueueTask) -> QueueResult<()> {
        let mut tasks = self.tasks.lock().await;
        let key = task.idempotency_key();
        if tasks.iter().any(|t| t.idempotency_key() == key) {
            debug!("Task already scheduled: {}", key);
            return Ok(());
        }
        tasks.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ProcessWebhookTask, SubmitRenderTask};
    use scast_models::RenderJobId;

    #[tokio::test]
    async fn memory_dispatcher_dedups_on_idempotency_key() {
        let dispatcher = MemoryDispatcher::new();
        let job_id = RenderJobId::from_string("job-1");

        dispatcher
            .dispatch(QueueTask::SubmitRender(SubmitRenderTask::new(
                job_id.clone(),
            )))
            .await
            .unwrap();
        dispatcher
            .dispatch(QueueTask::SubmitRender(SubmitRenderTask::new(job_id)))
            .await
            .unwrap();
        dispatcher
            .dispatch(QueueTask::ProcessWebhook(ProcessWebhookTask::new("evt-1")))
            .await
            .unwrap();

        let tasks = dispatcher.drain().await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].kind(), "submit_render");
        assert_eq!(tasks[1].kind(), "process_webhook");
    }
}
