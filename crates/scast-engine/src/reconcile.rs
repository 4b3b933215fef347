//! Reconciliation sweep for lost webhooks.
//!
//! Webhooks are best-effort; a delivery that never arrives would strand a
//! job in Processing forever. The sweep re-polls the provider for every
//! in-flight job older than the staleness threshold and applies the same
//! projection the webhook path uses, so the two paths can race safely.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use scast_heygen::HeyGenApi;
use scast_models::{project_status, Applied};
use scast_queue::{ArchiveRenderTask, QueueTask, TaskDispatcher};
use scast_store::RenderJobStore;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::metrics;

/// Counters from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// In-flight jobs polled
    pub checked: usize,
    /// Jobs moved to a terminal state by this sweep
    pub repaired: usize,
    /// Per-job poll or persist failures (sweep continues)
    pub errors: usize,
}

#[derive(Clone)]
pub struct ReconcileService {
    jobs: Arc<dyn RenderJobStore>,
    provider: Arc<dyn HeyGenApi>,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: EngineConfig,
}

impl ReconcileService {
    pub fn new(
        jobs: Arc<dyn RenderJobStore>,
        provider: Arc<dyn HeyGenApi>,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            jobs,
            provider,
            dispatcher,
            config,
        }
    }

    /// Run one full sweep. Per-job failures are logged and counted, never
    /// fatal to the batch.
    pub async fn run_sweep(&self) -> EngineResult<ReconcileReport> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(self.config.reconcile_staleness)
                .unwrap_or_else(|_| ChronoDuration::seconds(180));

        let stale = self.jobs.list_stale(cutoff).await?;
        let mut report = ReconcileReport::default();

        for batch in stale.chunks(self.config.reconcile_batch_size.max(1)) {
            for job in batch {
                report.checked += 1;
                match self.reconcile_one(job).await {
                    Ok(Applied::Completed | Applied::Failed) => report.repaired += 1,
                    Ok(_) => {}
                    Err(e) => {
                        report.errors += 1;
                        metrics::record_reconcile_failed();
                        warn!(job_id = %job.id, "Reconcile failed for job: {}", e);
                    }
                }
            }
        }

        metrics::record_reconcile_checked(report.checked as u64);
        Ok(report)
    }

    async fn reconcile_one(&self, job: &scast_models::RenderJob) -> EngineResult<Applied> {
        let Some(provider_video_id) = job.provider_video_id.as_deref() else {
            return Ok(Applied::Ignored);
        };

        let payload = self.provider.query_status(provider_video_id).await?;
        let projected = project_status(&payload);

        let mut job = job.clone();
        let applied = job.apply_projection(&projected, payload, Utc::now());
        self.jobs.update(&job).await?;

        match applied {
            Applied::Completed => {
                metrics::record_reconcile_repaired();
                info!(job_id = %job.id, "Reconcile completed job");
                self.dispatcher
                    .dispatch(QueueTask::ArchiveRender(ArchiveRenderTask::new(
                        job.id.clone(),
                    )))
                    .await?;
            }
            Applied::Failed => {
                metrics::record_reconcile_repaired();
                info!(job_id = %job.id, "Reconcile failed job from provider status");
            }
            Applied::Refreshed | Applied::Ignored => {}
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scast_heygen::{HeyGenError, MockHeyGenApi};
    use scast_models::{RenderJob, RenderJobStatus};
    use scast_queue::MemoryDispatcher;
    use scast_store::MemoryJobStore;
    use serde_json::json;

    async fn stale_job(jobs: &MemoryJobStore, provider_video_id: &str) -> RenderJob {
        let mut job = RenderJob::new("user-1", "a1", "v1", "hello");
        job.begin_submission().unwrap();
        job.record_submission(
            provider_video_id,
            json!({}),
            Utc::now() - ChronoDuration::minutes(10),
        )
        .unwrap();
        jobs.create(&job).await.unwrap();
        job
    }

    fn service(
        jobs: MemoryJobStore,
        provider: MockHeyGenApi,
        dispatcher: MemoryDispatcher,
    ) -> ReconcileService {
        ReconcileService::new(
            Arc::new(jobs),
            Arc::new(provider),
            Arc::new(dispatcher),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn sweep_completes_stale_job_and_schedules_archive() {
        let jobs = MemoryJobStore::new();
        let dispatcher = MemoryDispatcher::new();
        let job = stale_job(&jobs, "p-123").await;

        let mut provider = MockHeyGenApi::new();
        provider
            .expect_query_status()
            .withf(|pid| pid == "p-123")
            .times(1)
            .returning(|_| {
                Ok(json!({"data": {"status": "completed", "video_url": "https://cdn/x.mp4"}}))
            });

        let service = service(jobs.clone(), provider, dispatcher.clone());
        let report = service.run_sweep().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.errors, 0);

        let updated = jobs.find(&job.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RenderJobStatus::Completed);

        let tasks = dispatcher.drain().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind(), "archive_render");
    }

    #[tokio::test]
    async fn per_job_failure_does_not_abort_sweep() {
        let jobs = MemoryJobStore::new();
        let dispatcher = MemoryDispatcher::new();
        let broken = stale_job(&jobs, "p-broken").await;
        let healthy = stale_job(&jobs, "p-healthy").await;

        let mut provider = MockHeyGenApi::new();
        provider
            .expect_query_status()
            .withf(|pid| pid == "p-broken")
            .returning(|_| Err(HeyGenError::Unavailable("503".into())));
        provider
            .expect_query_status()
            .withf(|pid| pid == "p-healthy")
            .returning(|_| Ok(json!({"data": {"status": "failed", "error_message": "gone"}})));

        let service = service(jobs.clone(), provider, dispatcher);
        let report = service.run_sweep().await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.errors, 1);

        // The broken job stays in flight for the next sweep.
        let broken = jobs.find(&broken.id).await.unwrap().unwrap();
        assert_eq!(broken.status, RenderJobStatus::Processing);

        let healthy = jobs.find(&healthy.id).await.unwrap().unwrap();
        assert_eq!(healthy.status, RenderJobStatus::Failed);
    }

    #[tokio::test]
    async fn fresh_jobs_are_not_polled() {
        let jobs = MemoryJobStore::new();
        let mut job = RenderJob::new("user-1", "a1", "v1", "hello");
        job.begin_submission().unwrap();
        job.record_submission("p-fresh", json!({}), Utc::now()).unwrap();
        jobs.create(&job).await.unwrap();

        let provider = MockHeyGenApi::new();
        let service = service(jobs, provider, MemoryDispatcher::new());
        let report = service.run_sweep().await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[tokio::test]
    async fn intermediate_status_keeps_job_in_flight() {
        let jobs = MemoryJobStore::new();
        let dispatcher = MemoryDispatcher::new();
        let job = stale_job(&jobs, "p-123").await;

        let mut provider = MockHeyGenApi::new();
        provider
            .expect_query_status()
            .returning(|_| Ok(json!({"data": {"status": "rendering"}})));

        let service = service(jobs.clone(), provider, dispatcher.clone());
        let report = service.run_sweep().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.repaired, 0);

        let updated = jobs.find(&job.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RenderJobStatus::Processing);
        assert!(dispatcher.is_empty().await);
    }
}
