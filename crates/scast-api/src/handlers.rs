//! API handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use scast_engine::{IngestOutcome, SIGNATURE_HEADERS, TIMESTAMP_HEADERS};
use scast_models::{RenderJob, RenderJobId, RenderJobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Header carrying the caller identity. Authentication is handled upstream
/// (gateway); this service trusts the forwarded user id.
pub const OWNER_HEADER: &str = "x-user-id";

fn owner_id(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::unauthorized("Missing user identity header"))
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness check endpoint. Verifies Redis connectivity via the queue.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    match state.queue.len().await {
        Ok(_) => Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            error: None,
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".to_string(),
                error: Some(e.to_string()),
            }),
        )),
    }
}

// ============================================================================
// Videos
// ============================================================================

#[derive(Deserialize, Validate)]
pub struct CreateVideoRequest {
    #[validate(length(min = 1, max = 128))]
    pub avatar_id: String,
    #[validate(length(min = 1, max = 128))]
    pub voice_id: String,
    #[validate(length(min = 1))]
    pub script: String,
}

/// Render job view returned to clients. The raw provider payload and the
/// full script are deliberately omitted.
#[derive(Serialize)]
pub struct RenderJobResponse {
    pub id: String,
    pub status: RenderJobStatus,
    pub avatar_id: String,
    pub voice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_storage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&RenderJob> for RenderJobResponse {
    fn from(job: &RenderJob) -> Self {
        Self {
            id: job.id.as_str().to_string(),
            status: job.status,
            avatar_id: job.avatar_id.clone(),
            voice_id: job.voice_id.clone(),
            provider_video_id: job.provider_video_id.clone(),
            output_storage_url: job.output_storage_url.clone(),
            error_code: job.error_code.clone(),
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Submit a new render request.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateVideoRequest>,
) -> ApiResult<impl IntoResponse> {
    let owner = owner_id(&headers)?;
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let job = state
        .intake
        .create_render_job(&owner, &request.avatar_id, &request.voice_id, &request.script)
        .await?;

    info!(job_id = %job.id, owner_id = %owner, "Render request accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RenderJobResponse::from(&job)),
    ))
}

/// Fetch the status of a render job owned by the caller.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<RenderJobResponse>> {
    let owner = owner_id(&headers)?;
    let id = RenderJobId::from_string(video_id);

    let job = state
        .jobs
        .find(&id)
        .await?
        .filter(|j| j.owner_id == owner)
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    Ok(Json(RenderJobResponse::from(&job)))
}

// ============================================================================
// Webhooks
// ============================================================================

#[derive(Serialize)]
pub struct WebhookAck {
    pub status: String,
    pub event_id: String,
}

/// Receive a render status webhook from the provider.
///
/// Replies 202 for both new and duplicate events so the provider stops
/// retrying; 401 only on signature failure.
pub async fn heygen_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|h| headers.get(*h))
        .and_then(|v| v.to_str().ok());
    let timestamp = TIMESTAMP_HEADERS
        .iter()
        .find_map(|h| headers.get(*h))
        .and_then(|v| v.to_str().ok());

    match state.webhook.ingest(&body, signature, timestamp).await? {
        IngestOutcome::Accepted { provider_event_id } => Ok((
            StatusCode::ACCEPTED,
            Json(WebhookAck {
                status: "accepted".to_string(),
                event_id: provider_event_id,
            }),
        )),
        IngestOutcome::Duplicate { provider_event_id } => Ok((
            StatusCode::ACCEPTED,
            Json(WebhookAck {
                status: "duplicate".to_string(),
                event_id: provider_event_id,
            }),
        )),
        IngestOutcome::InvalidSignature { .. } => {
            Err(ApiError::unauthorized("Invalid webhook signature"))
        }
    }
}
