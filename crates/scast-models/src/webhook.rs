//! Webhook event record.
//!
//! One record per distinct provider notification, keyed by the provider
//! event ID. Events are persisted at ingestion time even when the signature
//! is invalid, so rejected deliveries stay auditable.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An inbound provider notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebhookEvent {
    /// Provider event ID, the idempotency key. A second delivery with the
    /// same ID neither creates a second record nor triggers re-processing.
    pub provider_event_id: String,

    /// Provider event type (e.g. `avatar_video.success`), `unknown` if absent
    pub event_type: String,

    /// Whether the HMAC signature verified at ingestion time
    pub signature_valid: bool,

    /// Raw JSON payload as received
    pub payload: serde_json::Value,

    /// When the event arrived
    pub received_at: DateTime<Utc>,

    /// When asynchronous processing finished (success or not)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Why processing stopped, if it did not apply a status update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
}

impl WebhookEvent {
    /// Create a new event record at ingestion time.
    pub fn new(
        provider_event_id: impl Into<String>,
        event_type: impl Into<String>,
        signature_valid: bool,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            provider_event_id: provider_event_id.into(),
            event_type: event_type.into(),
            signature_valid,
            payload,
            received_at: Utc::now(),
            processed_at: None,
            processing_error: None,
        }
    }

    /// Whether the asynchronous processor already handled this event.
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Mark processing finished, with an optional error note.
    pub fn mark_processed(&mut self, error: Option<String>, now: DateTime<Utc>) {
        self.processed_at = Some(now);
        self.processing_error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_event_is_unprocessed() {
        let event = WebhookEvent::new("evt-1", "avatar_video.success", true, json!({}));
        assert!(!event.is_processed());
        assert!(event.processing_error.is_none());
    }

    #[test]
    fn mark_processed_records_outcome() {
        let mut event = WebhookEvent::new("evt-1", "unknown", true, json!({}));
        event.mark_processed(Some("missing provider video ID".into()), Utc::now());
        assert!(event.is_processed());
        assert_eq!(
            event.processing_error.as_deref(),
            Some("missing provider video ID")
        );
    }
}
