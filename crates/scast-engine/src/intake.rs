//! Render request intake.
//!
//! The synchronous half of submission: validate the script, charge the
//! quota, persist the job in Queued, and schedule the provider submission
//! task. The quota is charged before the job exists so a crash in between
//! costs the user a request, never a free render.

use std::sync::Arc;

use scast_models::RenderJob;
use scast_queue::{QueueTask, SubmitRenderTask, TaskDispatcher};
use scast_store::RenderJobStore;
use tracing::info;

use crate::error::EngineResult;
use crate::quota::QuotaService;
use crate::script::ScriptPolicy;

#[derive(Clone)]
pub struct IntakeService {
    jobs: Arc<dyn RenderJobStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    quota: QuotaService,
    script_policy: ScriptPolicy,
}

impl IntakeService {
    pub fn new(
        jobs: Arc<dyn RenderJobStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        quota: QuotaService,
        script_policy: ScriptPolicy,
    ) -> Self {
        Self {
            jobs,
            dispatcher,
            quota,
            script_policy,
        }
    }

    /// Accept a render request and schedule its submission.
    pub async fn create_render_job(
        &self,
        owner_id: &str,
        avatar_id: &str,
        voice_id: &str,
        script: &str,
    ) -> EngineResult<RenderJob> {
        let script = self.script_policy.validate(script)?;
        self.quota.consume_video_request(owner_id).await?;

        let job = RenderJob::new(owner_id, avatar_id, voice_id, script);
        self.jobs.create(&job).await?;

        self.dispatcher
            .dispatch(QueueTask::SubmitRender(SubmitRenderTask::new(
                job.id.clone(),
            )))
            .await?;

        info!(job_id = %job.id, owner_id = %owner_id, "Render job accepted");
        Ok(job)
    }
}
