//! Storage trait seams.
//!
//! Each store trait has a Redis-backed production implementation and an
//! in-memory implementation used by tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scast_models::{
    LiveSession, LiveSessionId, QuotaRejection, RenderJob, RenderJobId, UsageLedgerEntry,
    WebhookEvent,
};

use crate::error::StoreResult;

/// Result of an atomic quota consumption attempt.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// The request was counted; the updated ledger entry is returned.
    Granted(UsageLedgerEntry),
    /// The request was refused and no counter changed.
    Rejected(QuotaRejection),
}

/// Persistence for render jobs.
#[async_trait]
pub trait RenderJobStore: Send + Sync {
    /// Persist a new job. Fails with `Conflict` if the id already exists.
    async fn create(&self, job: &RenderJob) -> StoreResult<()>;

    /// Persist the current state of an existing job.
    async fn update(&self, job: &RenderJob) -> StoreResult<()>;

    async fn find(&self, id: &RenderJobId) -> StoreResult<Option<RenderJob>>;

    /// Look up a job by the provider's video id.
    async fn find_by_provider_id(&self, provider_video_id: &str) -> StoreResult<Option<RenderJob>>;

    /// Jobs that are in flight (Submitting or Processing with a provider id)
    /// and were submitted at or before `cutoff` (or have no submission time).
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<RenderJob>>;
}

/// Persistence for inbound webhook events.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Insert the event if no event with the same provider event id exists.
    ///
    /// Returns `true` if the event was inserted and `false` if it was a
    /// duplicate delivery.
    async fn create_if_absent(&self, event: &WebhookEvent) -> StoreResult<bool>;

    async fn find(&self, provider_event_id: &str) -> StoreResult<Option<WebhookEvent>>;

    async fn update(&self, event: &WebhookEvent) -> StoreResult<()>;
}

/// Persistence for the per-owner daily usage ledger.
///
/// Implementations must make `try_consume_request` atomic: two concurrent
/// calls for the same (owner, day) must never both observe the same counter
/// value.
#[async_trait]
pub trait UsageLedgerStore: Send + Sync {
    /// Atomically consume one request from the owner's daily allowance,
    /// creating the ledger entry with the given limits if it does not exist
    /// yet.
    async fn try_consume_request(
        &self,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome>;

    /// Atomically add live session minutes to the owner's daily ledger.
    async fn record_live_minutes(
        &self,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
        minutes: i64,
    ) -> StoreResult<UsageLedgerEntry>;

    async fn find(&self, owner_id: &str, day: NaiveDate) -> StoreResult<Option<UsageLedgerEntry>>;
}

/// Persistence for interactive live sessions.
#[async_trait]
pub trait LiveSessionStore: Send + Sync {
    async fn create(&self, session: &LiveSession) -> StoreResult<()>;

    async fn update(&self, session: &LiveSession) -> StoreResult<()>;

    async fn find(&self, id: &LiveSessionId) -> StoreResult<Option<LiveSession>>;
}
