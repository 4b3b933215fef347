//! In-memory store backends.
//!
//! Used by unit and concurrency tests. The usage ledger holds one mutex
//! across all entries, which satisfies the per-entry exclusivity the trait
//! requires.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};

use scast_models::{
    LiveSession, LiveSessionId, RenderJob, RenderJobId, RenderJobStatus, UsageLedgerEntry,
    WebhookEvent,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    ConsumeOutcome, LiveSessionStore, RenderJobStore, UsageLedgerStore, WebhookEventStore,
};

/// In-memory render job store.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, RenderJob>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RenderJobStore for MemoryJobStore {
    async fn create(&self, job: &RenderJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(StoreError::conflict(format!(
                "job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn update(&self, job: &RenderJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(job.id.as_str()) {
            return Err(StoreError::not_found(format!("job {}", job.id)));
        }
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn find(&self, id: &RenderJobId) -> StoreResult<Option<RenderJob>> {
        Ok(self.jobs.read().await.get(id.as_str()).cloned())
    }

    async fn find_by_provider_id(&self, provider_video_id: &str) -> StoreResult<Option<RenderJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|j| j.provider_video_id.as_deref() == Some(provider_video_id))
            .cloned())
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<RenderJob>> {
        let jobs = self.jobs.read().await;
        let mut stale: Vec<RenderJob> = jobs
            .values()
            .filter(|j| {
                matches!(
                    j.status,
                    RenderJobStatus::Submitting | RenderJobStatus::Processing
                ) && j.provider_video_id.is_some()
                    && j.submitted_at.map(|t| t <= cutoff).unwrap_or(true)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|j| j.created_at);
        Ok(stale)
    }
}

/// In-memory webhook event store.
#[derive(Clone, Default)]
pub struct MemoryWebhookStore {
    events: Arc<RwLock<HashMap<String, WebhookEvent>>>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookEventStore for MemoryWebhookStore {
    async fn create_if_absent(&self, event: &WebhookEvent) -> StoreResult<bool> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.provider_event_id) {
            return Ok(false);
        }
        events.insert(event.provider_event_id.clone(), event.clone());
        Ok(true)
    }

    async fn find(&self, provider_event_id: &str) -> StoreResult<Option<WebhookEvent>> {
        Ok(self.events.read().await.get(provider_event_id).cloned())
    }

    async fn update(&self, event: &WebhookEvent) -> StoreResult<()> {
        let mut events = self.events.write().await;
        if !events.contains_key(&event.provider_event_id) {
            return Err(StoreError::not_found(format!(
                "webhook event {}",
                event.provider_event_id
            )));
        }
        events.insert(event.provider_event_id.clone(), event.clone());
        Ok(())
    }
}

/// In-memory usage ledger store.
#[derive(Clone, Default)]
pub struct MemoryUsageStore {
    entries: Arc<Mutex<HashMap<(String, NaiveDate), UsageLedgerEntry>>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLedgerStore for MemoryUsageStore {
    async fn try_consume_request(
        &self,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry((owner_id.to_string(), day))
            .or_insert_with(|| UsageLedgerEntry::new(owner_id, day, request_limit, minute_limit));

        match entry.try_consume_request(now) {
            Ok(()) => Ok(ConsumeOutcome::Granted(entry.clone())),
            Err(rejection) => Ok(ConsumeOutcome::Rejected(rejection)),
        }
    }

    async fn record_live_minutes(
        &self,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
        minutes: i64,
    ) -> StoreResult<UsageLedgerEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry((owner_id.to_string(), day))
            .or_insert_with(|| UsageLedgerEntry::new(owner_id, day, request_limit, minute_limit));
        entry.record_live_minutes(minutes);
        Ok(entry.clone())
    }

    async fn find(&self, owner_id: &str, day: NaiveDate) -> StoreResult<Option<UsageLedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(owner_id.to_string(), day))
            .cloned())
    }
}

/// In-memory live session store.
#[derive(Clone, Default)]
pub struct MemoryLiveSessionStore {
    sessions: Arc<RwLock<HashMap<String, LiveSession>>>,
}

impl MemoryLiveSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LiveSessionStore for MemoryLiveSessionStore {
    async fn create(&self, session: &LiveSession) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.id.as_str()) {
            return Err(StoreError::conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.as_str().to_string(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &LiveSession) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(session.id.as_str()) {
            return Err(StoreError::not_found(format!("session {}", session.id)));
        }
        sessions.insert(session.id.as_str().to_string(), session.clone());
        Ok(())
    }

    async fn find(&self, id: &LiveSessionId) -> StoreResult<Option<LiveSession>> {
        Ok(self.sessions.read().await.get(id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scast_models::QuotaRejection;

    #[tokio::test]
    async fn job_create_then_update_round_trip() {
        let store = MemoryJobStore::new();
        let mut job = RenderJob::new("user-1", "a1", "v1", "hello");
        store.create(&job).await.unwrap();
        assert!(matches!(store.create(&job).await, Err(StoreError::Conflict(_))));

        job.begin_submission().unwrap();
        store.update(&job).await.unwrap();

        let loaded = store.find(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, job.status);
    }

    #[tokio::test]
    async fn find_by_provider_id_matches_single_job() {
        let store = MemoryJobStore::new();
        let mut job = RenderJob::new("user-1", "a1", "v1", "hello");
        job.begin_submission().unwrap();
        job.record_submission("p-123", serde_json::json!({}), Utc::now())
            .unwrap();
        store.create(&job).await.unwrap();

        let found = store.find_by_provider_id("p-123").await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert!(store.find_by_provider_id("p-999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_stale_skips_fresh_and_terminal_jobs() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let cutoff = now - chrono::Duration::minutes(3);

        let mut stale = RenderJob::new("user-1", "a1", "v1", "old");
        stale.begin_submission().unwrap();
        stale
            .record_submission("p-old", serde_json::json!({}), now - chrono::Duration::minutes(10))
            .unwrap();
        store.create(&stale).await.unwrap();

        let mut fresh = RenderJob::new("user-1", "a1", "v1", "new");
        fresh.begin_submission().unwrap();
        fresh
            .record_submission("p-new", serde_json::json!({}), now)
            .unwrap();
        store.create(&fresh).await.unwrap();

        let queued = RenderJob::new("user-1", "a1", "v1", "not yet submitted");
        store.create(&queued).await.unwrap();

        let listed = store.list_stale(cutoff).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].provider_video_id.as_deref(), Some("p-old"));
    }

    #[tokio::test]
    async fn webhook_dedup_on_event_id() {
        let store = MemoryWebhookStore::new();
        let event = WebhookEvent::new("evt-1", "avatar_video.success", true, serde_json::json!({}));
        assert!(store.create_if_absent(&event).await.unwrap());
        assert!(!store.create_if_absent(&event).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_consumes_never_exceed_limit() {
        let store = Arc::new(MemoryUsageStore::new());
        let day = Utc::now().date_naive();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.try_consume_request("user-1", day, 5, 30, now).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if let ConsumeOutcome::Granted(_) = handle.await.unwrap().unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        let entry = store.find("user-1", day).await.unwrap().unwrap();
        assert_eq!(entry.video_requests, 5);
        assert!(entry.blocked_until.is_some());
    }

    #[tokio::test]
    async fn blocked_rejection_after_limit() {
        let store = MemoryUsageStore::new();
        let day = Utc::now().date_naive();
        let now = Utc::now();

        for _ in 0..2 {
            store.try_consume_request("u", day, 1, 30, now).await.unwrap();
        }

        // Third attempt sees the block set by the second.
        match store.try_consume_request("u", day, 1, 30, now).await.unwrap() {
            ConsumeOutcome::Rejected(QuotaRejection::Blocked { .. }) => {}
            other => panic!("expected blocked rejection, got {other:?}"),
        }
    }
}
