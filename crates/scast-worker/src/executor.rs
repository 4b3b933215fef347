//! Task executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scast_queue::{QueueTask, TaskQueue};

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};

/// Task executor that processes tasks from the queue.
pub struct TaskExecutor {
    config: WorkerConfig,
    queue: Arc<TaskQueue>,
    task_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl TaskExecutor {
    /// Create a new task executor.
    pub fn new(config: WorkerConfig, queue: Arc<TaskQueue>) -> Self {
        let task_semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            task_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting task executor '{}' with {} max concurrent tasks",
            self.consumer_name, self.config.max_concurrent_tasks
        );

        self.queue.init().await?;

        let ctx = Arc::new(WorkerContext::new(Arc::clone(&self.queue)).await?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // Spawn a task to claim orphaned pending messages periodically
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx_clone = Arc::clone(&ctx);
        let semaphore_clone = Arc::clone(&self.task_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle_ms, 5).await {
                            Ok(tasks) if !tasks.is_empty() => {
                                info!("Claimed {} pending tasks", tasks.len());
                                for (message_id, task) in tasks {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let permit = semaphore_clone.clone().acquire_owned().await;
                                    let Ok(permit) = permit else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_task(ctx, queue, message_id, task).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending tasks: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Periodic reconciliation sweep for jobs whose webhooks never arrived
        let ctx_sweep = Arc::clone(&ctx);
        let reconcile_interval = self.config.reconcile_interval;
        let mut shutdown_rx_sweep = self.shutdown.subscribe();

        let sweep_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(reconcile_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx_sweep.changed() => {
                        if *shutdown_rx_sweep.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match ctx_sweep.reconcile.run_sweep().await {
                            Ok(report) if report.checked > 0 => {
                                info!(
                                    checked = report.checked,
                                    repaired = report.repaired,
                                    errors = report.errors,
                                    "Reconciliation sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Reconciliation sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main task consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_tasks(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();
        sweep_task.abort();

        info!("Waiting for in-flight tasks to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_tasks()).await;

        info!("Task executor stopped");
        Ok(())
    }

    /// Consume and process tasks from the queue.
    async fn consume_tasks(&self, ctx: &Arc<WorkerContext>) -> WorkerResult<()> {
        let available = self.task_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let tasks = self
            .queue
            .consume(
                &self.consumer_name,
                1000, // Block for 1 second
                available.min(5),
            )
            .await?;

        if tasks.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} tasks from queue", tasks.len());

        for (message_id, task) in tasks {
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .task_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::task_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_task(ctx, queue, message_id, task).await;
            });
        }

        Ok(())
    }

    /// Execute a single task with retry and DLQ handling.
    async fn execute_task(
        ctx: Arc<WorkerContext>,
        queue: Arc<TaskQueue>,
        message_id: String,
        task: QueueTask,
    ) {
        let task_id = task.task_id().to_string();
        let kind = task.kind();
        info!(task_id = %task_id, kind = %kind, "Executing task");

        let result = Self::process_task(&ctx, &task).await;

        match result {
            Ok(()) => {
                info!(task_id = %task_id, kind = %kind, "Task completed");
                if let Err(e) = queue.ack(&message_id).await {
                    error!(task_id = %task_id, "Failed to ack task: {}", e);
                }
            }
            Err(e) if !e.is_retryable() => {
                // Permanent failures go straight to the DLQ
                warn!(task_id = %task_id, kind = %kind, "Task failed permanently: {}", e);
                if let Err(dlq_err) = queue.dlq(&message_id, &task, &e.to_string()).await {
                    error!(task_id = %task_id, "Failed to move task to DLQ: {}", dlq_err);
                }
                if let Err(e) = queue.clear_dedup(&task).await {
                    warn!(task_id = %task_id, "Failed to clear dedup key: {}", e);
                }
            }
            Err(e) => {
                error!(task_id = %task_id, kind = %kind, "Task failed: {}", e);

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(999);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        task_id = %task_id,
                        "Task exceeded max retries ({}), moving to DLQ",
                        max_retries
                    );
                    if let Err(dlq_err) = queue.dlq(&message_id, &task, &e.to_string()).await {
                        error!(task_id = %task_id, "Failed to move task to DLQ: {}", dlq_err);
                    }
                    // Clear dedup so the task can be enqueued again manually
                    if let Err(e) = queue.clear_dedup(&task).await {
                        warn!(task_id = %task_id, "Failed to clear dedup key: {}", e);
                    }
                } else {
                    info!(
                        task_id = %task_id,
                        "Task will be retried (attempt {}/{})",
                        retry_count,
                        max_retries
                    );
                    // Task will be redelivered after the visibility timeout
                }
            }
        }
    }

    /// Wait for all in-flight tasks to complete.
    async fn wait_for_tasks(&self) {
        loop {
            let available = self.task_semaphore.available_permits();
            if available == self.config.max_concurrent_tasks {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Route a task to its handler.
    async fn process_task(ctx: &WorkerContext, task: &QueueTask) -> WorkerResult<()> {
        match task {
            QueueTask::SubmitRender(t) => ctx.submit.submit(&t.job_id).await?,
            QueueTask::ProcessWebhook(t) => ctx.webhook.process(&t.provider_event_id).await?,
            QueueTask::ArchiveRender(t) => ctx.archive.archive(&t.job_id).await?,
        }
        Ok(())
    }
}
