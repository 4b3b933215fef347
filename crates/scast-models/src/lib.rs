//! Shared data models for the Scriptcast backend.
//!
//! This crate provides Serde-serializable types for:
//! - Render jobs and their lifecycle state machine
//! - Webhook events received from the rendering provider
//! - Per-user daily usage ledger entries
//! - Live avatar sessions
//! - Provider status projection (payload normalization rules)

pub mod job;
pub mod live;
pub mod projection;
pub mod usage;
pub mod webhook;

// Re-export common types
pub use job::{Applied, RenderJob, RenderJobId, RenderJobStatus, TransitionError};
pub use live::{LiveSession, LiveSessionId, LiveSessionStatus};
pub use projection::{
    extract_catalog_items, extract_event_id, extract_event_type, extract_provider_video_id,
    project_status, ProjectedStatus,
};
pub use usage::{QuotaRejection, UsageLedgerEntry};
pub use webhook::WebhookEvent;
