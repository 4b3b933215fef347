//! Live avatar session workflow.
//!
//! The media transport itself runs between the provider and the browser;
//! the backend issues the streaming token, opens and closes the provider
//! session, and feeds elapsed minutes into the usage ledger.

use std::sync::Arc;

use chrono::Utc;
use scast_heygen::HeyGenApi;
use scast_models::{LiveSession, LiveSessionId, LiveSessionStatus};
use scast_store::LiveSessionStore;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::quota::QuotaService;

#[derive(Clone)]
pub struct LiveService {
    provider: Arc<dyn HeyGenApi>,
    sessions: Arc<dyn LiveSessionStore>,
    quota: QuotaService,
}

impl LiveService {
    pub fn new(
        provider: Arc<dyn HeyGenApi>,
        sessions: Arc<dyn LiveSessionStore>,
        quota: QuotaService,
    ) -> Self {
        Self {
            provider,
            sessions,
            quota,
        }
    }

    /// Open a live session: streaming token, provider session, local record.
    pub async fn start(&self, owner_id: &str, params: Value) -> EngineResult<LiveSession> {
        let token = self.provider.create_streaming_token().await?;
        let provider_session = self.provider.create_live_session(params).await?;

        let provider_session_id = provider_session
            .get("data")
            .and_then(|d| d.get("session_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut session = LiveSession::new(owner_id);
        session.provider_session_id = provider_session_id;
        session.status = LiveSessionStatus::Active;
        session.metadata = Some(json!({
            "token": token,
            "session": provider_session,
        }));

        self.sessions.create(&session).await?;
        info!(session_id = %session.id, owner_id = %owner_id, "Live session started");
        Ok(session)
    }

    /// Close a live session and account its minutes. Idempotent: ending an
    /// ended session returns it unchanged.
    pub async fn end(&self, session_id: &LiveSessionId) -> EngineResult<LiveSession> {
        let mut session = self
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        if session.status == LiveSessionStatus::Ended {
            return Ok(session);
        }

        // Best effort: a session the provider already dropped still ends
        // locally.
        if let Some(provider_session_id) = session.provider_session_id.as_deref() {
            if let Err(e) = self.provider.end_live_session(provider_session_id).await {
                warn!(
                    session_id = %session.id,
                    "Provider session stop failed: {}", e
                );
            }
        }

        let minutes = session.end(Utc::now());
        self.sessions.update(&session).await?;
        self.quota
            .record_live_minutes(&session.owner_id, minutes)
            .await?;

        info!(
            session_id = %session.id,
            minutes,
            "Live session ended"
        );
        Ok(session)
    }
}
