//! Live avatar session record.
//!
//! The streaming protocol itself is handled by the provider and the browser;
//! the backend only tracks the session lifecycle and feeds elapsed minutes
//! into the usage ledger.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LiveSessionId(pub String);

impl LiveSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LiveSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LiveSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LiveSessionStatus {
    Created,
    Active,
    Ended,
}

/// One real-time avatar session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LiveSession {
    /// Unique session ID
    pub id: LiveSessionId,
    /// Owning user
    pub owner_id: String,
    /// Provider-side session ID, if the provider returned one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_session_id: Option<String>,
    /// Lifecycle status
    pub status: LiveSessionStatus,
    /// When the streaming access token expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Session start
    pub started_at: DateTime<Utc>,
    /// Session end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Token and ICE-server payloads from the provider, kept verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LiveSession {
    /// Create a new session record.
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            id: LiveSessionId::new(),
            owner_id: owner_id.into(),
            provider_session_id: None,
            status: LiveSessionStatus::Created,
            token_expires_at: None,
            started_at: Utc::now(),
            ended_at: None,
            metadata: None,
        }
    }

    /// Mark the session ended and return the elapsed whole minutes.
    pub fn end(&mut self, now: DateTime<Utc>) -> i64 {
        self.status = LiveSessionStatus::Ended;
        self.ended_at = Some(now);
        (now - self.started_at).num_minutes().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ending_a_session_yields_elapsed_minutes() {
        let mut session = LiveSession::new("user-1");
        session.started_at = Utc::now() - Duration::minutes(7);

        let minutes = session.end(Utc::now());
        assert_eq!(minutes, 7);
        assert_eq!(session.status, LiveSessionStatus::Ended);
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn elapsed_minutes_never_negative() {
        let mut session = LiveSession::new("user-1");
        let before_start = session.started_at - Duration::minutes(5);
        assert_eq!(session.end(before_start), 0);
    }
}
