//! Webhook ingestion and processing.
//!
//! Ingestion is the synchronous hot path behind the HTTP endpoint: verify
//! the signature, persist the event exactly once, and schedule processing.
//! Processing runs later as a queued task and applies the projected status
//! to the correlated job. Both halves are idempotent: the event store
//! dedups on the provider event id, and terminal jobs absorb re-applied
//! projections.

use std::sync::Arc;

use chrono::Utc;
use scast_models::{
    extract_event_id, extract_event_type, extract_provider_video_id, project_status, Applied,
    WebhookEvent,
};
use scast_queue::{ArchiveRenderTask, ProcessWebhookTask, QueueTask, TaskDispatcher};
use scast_store::{RenderJobStore, WebhookEventStore};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::signature::verify_signature;

/// Outcome of the synchronous ingestion phase, mapped to an HTTP status by
/// the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New event persisted, processing scheduled. 202.
    Accepted { provider_event_id: String },
    /// Same event id seen before; nothing scheduled. 202.
    Duplicate { provider_event_id: String },
    /// Signature did not verify; event persisted for audit. 401.
    InvalidSignature { provider_event_id: String },
}

#[derive(Clone)]
pub struct WebhookService {
    events: Arc<dyn WebhookEventStore>,
    jobs: Arc<dyn RenderJobStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    config: EngineConfig,
}

impl WebhookService {
    pub fn new(
        events: Arc<dyn WebhookEventStore>,
        jobs: Arc<dyn RenderJobStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            events,
            jobs,
            dispatcher,
            config,
        }
    }

    /// Synchronous ingestion phase.
    ///
    /// Never parses deeply and never touches the provider: extract the event
    /// id, verify the signature, persist, schedule. A body that is not JSON
    /// is still recorded (signature permitting) so nothing is lost.
    pub async fn ingest(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        timestamp_header: Option<&str>,
    ) -> EngineResult<IngestOutcome> {
        let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

        // Providers have shipped webhooks without event ids; fall back to a
        // digest of the body so redeliveries still dedup.
        let provider_event_id =
            extract_event_id(&payload).unwrap_or_else(|| body_digest_id(body));
        let event_type = extract_event_type(&payload);

        let signature_valid = verify_signature(
            self.config.webhook_secret.as_deref(),
            body,
            signature_header,
            timestamp_header,
            self.config.timestamp_tolerance,
            Utc::now(),
        );

        let event = WebhookEvent::new(&provider_event_id, &event_type, signature_valid, payload);
        let created = self.events.create_if_absent(&event).await?;

        if !created {
            metrics::record_webhook_duplicate();
            info!(event_id = %provider_event_id, "Duplicate webhook delivery");
            return Ok(IngestOutcome::Duplicate { provider_event_id });
        }

        if !signature_valid {
            metrics::record_webhook_rejected();
            warn!(event_id = %provider_event_id, "Webhook signature rejected");
            return Ok(IngestOutcome::InvalidSignature { provider_event_id });
        }

        self.dispatcher
            .dispatch(QueueTask::ProcessWebhook(ProcessWebhookTask::new(
                &provider_event_id,
            )))
            .await?;

        metrics::record_webhook_accepted();
        info!(
            event_id = %provider_event_id,
            event_type = %event_type,
            "Webhook accepted"
        );
        Ok(IngestOutcome::Accepted { provider_event_id })
    }

    /// Asynchronous processing phase, run as a queued task.
    ///
    /// Unresolvable events (no provider video id, no matching job) are marked
    /// processed with an error note and not retried; transport failures leave
    /// the event unprocessed so the queue retry picks it up again.
    pub async fn process(&self, provider_event_id: &str) -> EngineResult<()> {
        let mut event = self
            .events
            .find(provider_event_id)
            .await?
            .ok_or_else(|| EngineError::EventNotFound(provider_event_id.to_string()))?;

        if event.is_processed() {
            info!(event_id = %provider_event_id, "Event already processed");
            return Ok(());
        }

        if !event.signature_valid {
            return self
                .finish(&mut event, Some("signature invalid at ingestion".into()))
                .await;
        }

        let Some(provider_video_id) = extract_provider_video_id(&event.payload) else {
            warn!(event_id = %provider_event_id, "Webhook payload carries no provider video id");
            return self
                .finish(&mut event, Some("missing provider video id".into()))
                .await;
        };

        let Some(mut job) = self.jobs.find_by_provider_id(&provider_video_id).await? else {
            warn!(
                event_id = %provider_event_id,
                provider_video_id = %provider_video_id,
                "No job matches webhook correlation key"
            );
            return self
                .finish(
                    &mut event,
                    Some(format!("no job for provider video id {}", provider_video_id)),
                )
                .await;
        };

        let projected = project_status(&event.payload);
        let applied = job.apply_projection(&projected, event.payload.clone(), Utc::now());
        self.jobs.update(&job).await?;

        info!(
            event_id = %provider_event_id,
            job_id = %job.id,
            status = %job.status,
            "Webhook applied"
        );

        if applied == Applied::Completed {
            self.dispatcher
                .dispatch(QueueTask::ArchiveRender(ArchiveRenderTask::new(
                    job.id.clone(),
                )))
                .await?;
        }

        self.finish(&mut event, None).await
    }

    async fn finish(&self, event: &mut WebhookEvent, error: Option<String>) -> EngineResult<()> {
        event.mark_processed(error, Utc::now());
        self.events.update(event).await?;
        Ok(())
    }
}

/// Deterministic fallback event id for payloads without one.
fn body_digest_id(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("body-{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use scast_models::{RenderJob, RenderJobStatus};
    use scast_queue::MemoryDispatcher;
    use scast_store::{MemoryJobStore, MemoryWebhookStore};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    struct Fixture {
        service: WebhookService,
        jobs: MemoryJobStore,
        events: MemoryWebhookStore,
        dispatcher: MemoryDispatcher,
    }

    fn fixture() -> Fixture {
        let jobs = MemoryJobStore::new();
        let events = MemoryWebhookStore::new();
        let dispatcher = MemoryDispatcher::new();
        let config = EngineConfig {
            webhook_secret: Some(SECRET.to_string()),
            ..EngineConfig::default()
        };
        let service = WebhookService::new(
            Arc::new(events.clone()),
            Arc::new(jobs.clone()),
            Arc::new(dispatcher.clone()),
            config,
        );
        Fixture {
            service,
            jobs,
            events,
            dispatcher,
        }
    }

    async fn seed_processing_job(jobs: &MemoryJobStore, provider_video_id: &str) -> RenderJob {
        let mut job = RenderJob::new("user-1", "a1", "v1", "hello");
        job.begin_submission().unwrap();
        job.record_submission(provider_video_id, json!({}), Utc::now())
            .unwrap();
        jobs.create(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn valid_webhook_is_accepted_and_scheduled() {
        let f = fixture();
        let body = serde_json::to_vec(&json!({
            "event_id": "evt-1",
            "event_type": "avatar_video.success",
            "data": {"video_id": "p-123", "status": "completed"},
        }))
        .unwrap();

        let outcome = f.service.ingest(&body, Some(&sign(&body)), None).await.unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                provider_event_id: "evt-1".into()
            }
        );

        let stored = f.events.find("evt-1").await.unwrap().unwrap();
        assert!(stored.signature_valid);
        assert!(!stored.is_processed());

        let tasks = f.dispatcher.drain().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].idempotency_key(), "webhook:evt-1");
    }

    #[tokio::test]
    async fn duplicate_delivery_stores_once_and_schedules_once() {
        let f = fixture();
        let body = serde_json::to_vec(&json!({"event_id": "evt-1"})).unwrap();
        let sig = sign(&body);

        f.service.ingest(&body, Some(&sig), None).await.unwrap();
        let outcome = f.service.ingest(&body, Some(&sig), None).await.unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Duplicate {
                provider_event_id: "evt-1".into()
            }
        );
        assert_eq!(f.dispatcher.len().await, 1);
    }

    #[tokio::test]
    async fn invalid_signature_is_persisted_but_not_scheduled() {
        let f = fixture();
        let body = serde_json::to_vec(&json!({"event_id": "evt-bad"})).unwrap();

        let outcome = f.service.ingest(&body, Some("nope"), None).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::InvalidSignature { .. }));

        let stored = f.events.find("evt-bad").await.unwrap().unwrap();
        assert!(!stored.signature_valid);
        assert!(f.dispatcher.is_empty().await);
    }

    #[tokio::test]
    async fn missing_event_id_falls_back_to_body_digest() {
        let f = fixture();
        let body = serde_json::to_vec(&json!({"data": {"video_id": "p-1"}})).unwrap();
        let sig = sign(&body);

        let first = f.service.ingest(&body, Some(&sig), None).await.unwrap();
        let IngestOutcome::Accepted { provider_event_id } = first else {
            panic!("expected accepted");
        };
        assert!(provider_event_id.starts_with("body-"));

        // The same body redelivered dedups on the digest.
        let second = f.service.ingest(&body, Some(&sig), None).await.unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn processing_completes_job_and_schedules_archive() {
        let f = fixture();
        let job = seed_processing_job(&f.jobs, "p-123").await;

        let body = serde_json::to_vec(&json!({
            "event_id": "evt-1",
            "event_type": "avatar_video.success",
            "data": {"video_id": "p-123", "status": "completed", "video_url": "https://cdn/x.mp4"},
        }))
        .unwrap();
        f.service.ingest(&body, Some(&sign(&body)), None).await.unwrap();
        f.dispatcher.drain().await;

        f.service.process("evt-1").await.unwrap();

        let updated = f.jobs.find(&job.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RenderJobStatus::Completed);
        assert_eq!(updated.output_provider_url.as_deref(), Some("https://cdn/x.mp4"));

        let tasks = f.dispatcher.drain().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind(), "archive_render");

        let event = f.events.find("evt-1").await.unwrap().unwrap();
        assert!(event.is_processed());
        assert!(event.processing_error.is_none());
    }

    #[tokio::test]
    async fn reprocessing_is_a_no_op() {
        let f = fixture();
        seed_processing_job(&f.jobs, "p-123").await;

        let body = serde_json::to_vec(&json!({
            "event_id": "evt-1",
            "data": {"video_id": "p-123", "status": "completed", "video_url": "https://cdn/x.mp4"},
        }))
        .unwrap();
        f.service.ingest(&body, Some(&sign(&body)), None).await.unwrap();
        f.dispatcher.drain().await;

        f.service.process("evt-1").await.unwrap();
        f.dispatcher.drain().await;
        f.service.process("evt-1").await.unwrap();

        // No second archive task.
        assert!(f.dispatcher.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_correlation_is_recorded_not_retried() {
        let f = fixture();
        let body = serde_json::to_vec(&json!({
            "event_id": "evt-2",
            "data": {"video_id": "p-unknown", "status": "completed"},
        }))
        .unwrap();
        f.service.ingest(&body, Some(&sign(&body)), None).await.unwrap();

        f.service.process("evt-2").await.unwrap();

        let event = f.events.find("evt-2").await.unwrap().unwrap();
        assert!(event.is_processed());
        assert!(event
            .processing_error
            .as_deref()
            .unwrap()
            .contains("p-unknown"));
    }

    #[tokio::test]
    async fn failure_webhook_marks_job_failed() {
        let f = fixture();
        let job = seed_processing_job(&f.jobs, "p-123").await;

        let body = serde_json::to_vec(&json!({
            "event_id": "evt-3",
            "event_type": "avatar_video.fail",
            "data": {"video_id": "p-123", "status": "failed", "error_message": "render exploded"},
        }))
        .unwrap();
        f.service.ingest(&body, Some(&sign(&body)), None).await.unwrap();
        f.dispatcher.drain().await;

        f.service.process("evt-3").await.unwrap();

        let updated = f.jobs.find(&job.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RenderJobStatus::Failed);
        assert_eq!(updated.error_message.as_deref(), Some("render exploded"));
        assert!(f.dispatcher.is_empty().await);
    }
}
