//! Render job record and lifecycle state machine.
//!
//! One `RenderJob` tracks a single user request for an avatar video from
//! creation through provider submission to a terminal state. All status
//! mutations go through the methods here so the transition rules live in
//! exactly one place.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::projection::ProjectedStatus;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RenderJobId(pub String);

impl RenderJobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RenderJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RenderJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render job lifecycle status.
///
/// Legal transitions: `Queued -> Submitting -> Processing -> {Completed | Failed}`,
/// plus `Submitting -> Failed` when provider submission errors. Completed and
/// Failed are terminal; nothing transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderJobStatus {
    /// Created, waiting for the submission workflow
    #[default]
    Queued,
    /// Submission to the provider is in flight
    Submitting,
    /// Provider accepted the job and is rendering
    Processing,
    /// Provider reported success
    Completed,
    /// Submission or rendering failed
    Failed,
}

impl RenderJobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderJobStatus::Queued => "queued",
            RenderJobStatus::Submitting => "submitting",
            RenderJobStatus::Processing => "processing",
            RenderJobStatus::Completed => "completed",
            RenderJobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates accepted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderJobStatus::Completed | RenderJobStatus::Failed)
    }
}

impl fmt::Display for RenderJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Illegal transition from {from} to {to}")]
    Invalid {
        from: RenderJobStatus,
        to: RenderJobStatus,
    },

    #[error("Provider video ID is already set to {0}")]
    ProviderIdAlreadySet(String),

    #[error("Storage URL is already set")]
    AlreadyArchived,

    #[error("Cannot archive a job with no provider output URL")]
    MissingProviderUrl,
}

/// Outcome of applying a projected provider status to a job.
///
/// Tells the caller what actually happened, so side effects (archive
/// scheduling) are driven by the transition and not by re-reading state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Job reached Completed on this application; archive should be scheduled.
    Completed,
    /// Job reached Failed on this application.
    Failed,
    /// Non-terminal provider status; raw payload refreshed only.
    Refreshed,
    /// Job was already terminal; nothing changed.
    Ignored,
}

/// One user request to generate an avatar video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    /// Unique job ID
    pub id: RenderJobId,

    /// Owning user
    pub owner_id: String,

    /// Provider-side video ID; set exactly once at submission time and
    /// unique across all jobs. The correlation key for all later updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_video_id: Option<String>,

    /// Avatar to render with
    pub avatar_id: String,

    /// Voice to speak with
    pub voice_id: String,

    /// Script text to speak
    pub script: String,

    /// Current lifecycle status
    #[serde(default)]
    pub status: RenderJobStatus,

    /// Stable error code (e.g. `submit_failed`, `provider_failed`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Human-readable error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Raw last provider status payload, kept verbatim for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_payload: Option<serde_json::Value>,

    /// Transient output URL on the provider's CDN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_provider_url: Option<String>,

    /// Durable output URL in our own storage; set at most once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_storage_url: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the provider accepted the submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    /// When the provider reported success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// When the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl RenderJob {
    /// Create a new job in `Queued`.
    pub fn new(
        owner_id: impl Into<String>,
        avatar_id: impl Into<String>,
        voice_id: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            id: RenderJobId::new(),
            owner_id: owner_id.into(),
            provider_video_id: None,
            avatar_id: avatar_id.into(),
            voice_id: voice_id.into(),
            script: script.into(),
            status: RenderJobStatus::Queued,
            error_code: None,
            error_message: None,
            provider_payload: None,
            output_provider_url: None,
            output_storage_url: None,
            created_at: Utc::now(),
            submitted_at: None,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Enter `Submitting` and clear stale error fields.
    ///
    /// Allowed from `Queued`, and from `Submitting` itself so a redelivered
    /// submission task is harmless.
    pub fn begin_submission(&mut self) -> Result<(), TransitionError> {
        match self.status {
            RenderJobStatus::Queued | RenderJobStatus::Submitting => {
                self.status = RenderJobStatus::Submitting;
                self.error_code = None;
                self.error_message = None;
                Ok(())
            }
            from => Err(TransitionError::Invalid {
                from,
                to: RenderJobStatus::Submitting,
            }),
        }
    }

    /// Record a successful provider submission: persist the provider video
    /// ID and move to `Processing`.
    pub fn record_submission(
        &mut self,
        provider_video_id: impl Into<String>,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != RenderJobStatus::Submitting {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: RenderJobStatus::Processing,
            });
        }
        let provider_video_id = provider_video_id.into();
        if let Some(existing) = &self.provider_video_id {
            if existing != &provider_video_id {
                return Err(TransitionError::ProviderIdAlreadySet(existing.clone()));
            }
        }
        self.provider_video_id = Some(provider_video_id);
        self.provider_payload = Some(raw_response);
        self.status = RenderJobStatus::Processing;
        self.submitted_at = Some(now);
        Ok(())
    }

    /// Mark the job failed because provider submission errored.
    pub fn mark_submit_failed(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != RenderJobStatus::Submitting {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: RenderJobStatus::Failed,
            });
        }
        self.status = RenderJobStatus::Failed;
        self.failed_at = Some(now);
        self.error_code = Some("submit_failed".to_string());
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Apply a projected provider status (shared by the webhook and
    /// reconciliation paths).
    ///
    /// Terminal jobs absorb any further application: racing updates between a
    /// webhook and a concurrent reconciliation poll resolve to
    /// first-writer-wins, and re-delivery is a no-op.
    pub fn apply_projection(
        &mut self,
        projected: &ProjectedStatus,
        raw_payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Applied {
        if self.is_terminal() {
            return Applied::Ignored;
        }

        match projected {
            ProjectedStatus::Completed { video_url } => {
                self.status = RenderJobStatus::Completed;
                self.completed_at = Some(now);
                self.failed_at = None;
                if let Some(url) = video_url {
                    if !url.is_empty() {
                        self.output_provider_url = Some(url.clone());
                    }
                }
                self.provider_payload = Some(raw_payload);
                self.error_code = None;
                self.error_message = None;
                Applied::Completed
            }
            ProjectedStatus::Failed {
                error_code,
                error_message,
            } => {
                self.status = RenderJobStatus::Failed;
                self.failed_at = Some(now);
                self.provider_payload = Some(raw_payload);
                self.error_code = Some(error_code.clone());
                self.error_message = Some(error_message.clone());
                Applied::Failed
            }
            ProjectedStatus::Processing => {
                // Unknown/intermediate provider states are not failures.
                self.status = RenderJobStatus::Processing;
                self.provider_payload = Some(raw_payload);
                Applied::Refreshed
            }
        }
    }

    /// Persist the durable storage URL. Set at most once and only after a
    /// provider output URL exists.
    pub fn record_storage_url(&mut self, url: impl Into<String>) -> Result<(), TransitionError> {
        if self.output_storage_url.is_some() {
            return Err(TransitionError::AlreadyArchived);
        }
        match &self.output_provider_url {
            Some(u) if !u.is_empty() => {
                self.output_storage_url = Some(url.into());
                Ok(())
            }
            _ => Err(TransitionError::MissingProviderUrl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectedStatus;
    use serde_json::json;

    fn queued_job() -> RenderJob {
        RenderJob::new("user-1", "a1", "v1", "hello")
    }

    fn submitted_job() -> RenderJob {
        let mut job = queued_job();
        job.begin_submission().unwrap();
        job.record_submission("p-123", json!({"video_id": "p-123"}), Utc::now())
            .unwrap();
        job
    }

    #[test]
    fn new_job_starts_queued() {
        let job = queued_job();
        assert_eq!(job.status, RenderJobStatus::Queued);
        assert!(!job.is_terminal());
        assert!(job.provider_video_id.is_none());
    }

    #[test]
    fn begin_submission_clears_errors() {
        let mut job = queued_job();
        job.error_code = Some("stale".into());
        job.error_message = Some("stale".into());
        job.begin_submission().unwrap();
        assert_eq!(job.status, RenderJobStatus::Submitting);
        assert!(job.error_code.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn record_submission_sets_provider_id_once() {
        let mut job = submitted_job();
        assert_eq!(job.status, RenderJobStatus::Processing);
        assert_eq!(job.provider_video_id.as_deref(), Some("p-123"));
        assert!(job.submitted_at.is_some());

        // A different provider ID is refused.
        job.status = RenderJobStatus::Submitting;
        let err = job
            .record_submission("p-456", json!({}), Utc::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::ProviderIdAlreadySet("p-123".into()));
    }

    #[test]
    fn submit_failure_is_terminal() {
        let mut job = queued_job();
        job.begin_submission().unwrap();
        job.mark_submit_failed("connection reset", Utc::now()).unwrap();
        assert_eq!(job.status, RenderJobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("submit_failed"));
        assert!(job.begin_submission().is_err());
    }

    #[test]
    fn completed_projection_records_url_and_clears_errors() {
        let mut job = submitted_job();
        let payload = json!({"status": "completed", "video_url": "https://cdn/x.mp4"});
        let applied = job.apply_projection(
            &ProjectedStatus::Completed {
                video_url: Some("https://cdn/x.mp4".into()),
            },
            payload,
            Utc::now(),
        );
        assert_eq!(applied, Applied::Completed);
        assert_eq!(job.status, RenderJobStatus::Completed);
        assert_eq!(job.output_provider_url.as_deref(), Some("https://cdn/x.mp4"));
        assert!(job.completed_at.is_some());
        assert!(job.failed_at.is_none());
    }

    #[test]
    fn terminal_jobs_absorb_further_projections() {
        let mut job = submitted_job();
        job.apply_projection(
            &ProjectedStatus::Completed { video_url: None },
            json!({}),
            Utc::now(),
        );

        let applied = job.apply_projection(
            &ProjectedStatus::Failed {
                error_code: "provider_failed".into(),
                error_message: "boom".into(),
            },
            json!({}),
            Utc::now(),
        );
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(job.status, RenderJobStatus::Completed);
        assert!(job.error_code.is_none());
    }

    #[test]
    fn intermediate_status_only_refreshes_payload() {
        let mut job = submitted_job();
        let applied = job.apply_projection(
            &ProjectedStatus::Processing,
            json!({"status": "waiting"}),
            Utc::now(),
        );
        assert_eq!(applied, Applied::Refreshed);
        assert_eq!(job.status, RenderJobStatus::Processing);
        assert_eq!(
            job.provider_payload,
            Some(json!({"status": "waiting"}))
        );
    }

    #[test]
    fn storage_url_set_at_most_once() {
        let mut job = submitted_job();
        assert_eq!(
            job.record_storage_url("local://x"),
            Err(TransitionError::MissingProviderUrl)
        );

        job.apply_projection(
            &ProjectedStatus::Completed {
                video_url: Some("https://cdn/x.mp4".into()),
            },
            json!({}),
            Utc::now(),
        );
        job.record_storage_url("https://store/x.mp4").unwrap();
        assert_eq!(
            job.record_storage_url("https://store/y.mp4"),
            Err(TransitionError::AlreadyArchived)
        );
        assert_eq!(job.output_storage_url.as_deref(), Some("https://store/x.mp4"));
    }
}
