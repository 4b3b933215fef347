//! Provider submission workflow.
//!
//! Takes a queued render job, submits it to the provider, and persists the
//! unique provider video id that correlates all later status updates. Runs
//! as a queued task, so a redelivered task must be harmless: terminal jobs
//! are skipped outright.

use std::sync::Arc;

use chrono::Utc;
use scast_heygen::HeyGenApi;
use scast_models::{extract_provider_video_id, RenderJobId};
use scast_store::RenderJobStore;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::metrics;

#[derive(Clone)]
pub struct SubmitService {
    jobs: Arc<dyn RenderJobStore>,
    provider: Arc<dyn HeyGenApi>,
}

impl SubmitService {
    pub fn new(jobs: Arc<dyn RenderJobStore>, provider: Arc<dyn HeyGenApi>) -> Self {
        Self { jobs, provider }
    }

    /// Submit a job to the provider.
    ///
    /// A failed provider call marks the job Failed with code `submit_failed`
    /// and re-raises the error; the queue's bounded retry re-invokes this
    /// handler, which then finds the job terminal and acks.
    pub async fn submit(&self, job_id: &RenderJobId) -> EngineResult<()> {
        let mut job = self
            .jobs
            .find(job_id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;

        if job.is_terminal() {
            info!(job_id = %job.id, status = %job.status, "Skipping terminal job");
            return Ok(());
        }

        job.begin_submission()?;
        self.jobs.update(&job).await?;

        let response = match self
            .provider
            .submit_render(&job.avatar_id, &job.voice_id, &job.script)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(job_id = %job.id, "Provider submission failed: {}", e);
                job.mark_submit_failed(e.to_string(), Utc::now())?;
                self.jobs.update(&job).await?;
                metrics::record_submission("failed");
                return Err(e.into());
            }
        };

        let Some(provider_video_id) = extract_provider_video_id(&response) else {
            let message = "provider response carried no video id";
            job.mark_submit_failed(message, Utc::now())?;
            self.jobs.update(&job).await?;
            metrics::record_submission("failed");
            return Err(EngineError::submission_failed(message));
        };

        job.record_submission(&provider_video_id, response, Utc::now())?;
        self.jobs.update(&job).await?;
        metrics::record_submission("accepted");

        info!(
            job_id = %job.id,
            provider_video_id = %provider_video_id,
            "Render submitted to provider"
        );
        Ok(())
    }
}
