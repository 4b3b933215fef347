//! Redis-backed store.
//!
//! Records are stored as JSON strings. Uniqueness constraints (webhook
//! event ids, provider video ids) use SET NX, and ledger mutations run
//! under a short-lived per-entry lock so concurrent consumers serialize.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};
use uuid::Uuid;

use scast_models::{
    LiveSession, LiveSessionId, RenderJob, RenderJobId, RenderJobStatus, UsageLedgerEntry,
    WebhookEvent,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    ConsumeOutcome, LiveSessionStore, RenderJobStore, UsageLedgerStore, WebhookEventStore,
};

const JOB_KEY_PREFIX: &str = "scast:job";
const JOB_PROVIDER_KEY_PREFIX: &str = "scast:job:provider";
const JOBS_ACTIVE_KEY: &str = "scast:jobs:active";
const WEBHOOK_KEY_PREFIX: &str = "scast:webhook";
const USAGE_KEY_PREFIX: &str = "scast:usage";
const USAGE_LOCK_KEY_PREFIX: &str = "scast:usage_lock";
const LIVE_KEY_PREFIX: &str = "scast:live";

/// Ledger lock TTL. Long enough to cover a read-modify-write, short enough
/// that a crashed holder does not stall the account.
const USAGE_LOCK_TTL_SECS: u64 = 5;

/// Maximum attempts to take the ledger lock before giving up.
const USAGE_LOCK_RETRIES: u32 = 40;

/// Delay between ledger lock attempts.
const USAGE_LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Redis-backed implementation of all store traits.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Create a store from a Redis URL.
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn job_key(id: &RenderJobId) -> String {
        format!("{}:{}", JOB_KEY_PREFIX, id)
    }

    fn provider_key(provider_video_id: &str) -> String {
        format!("{}:{}", JOB_PROVIDER_KEY_PREFIX, provider_video_id)
    }

    fn webhook_key(provider_event_id: &str) -> String {
        format!("{}:{}", WEBHOOK_KEY_PREFIX, provider_event_id)
    }

    fn usage_key(owner_id: &str, day: NaiveDate) -> String {
        format!("{}:{}:{}", USAGE_KEY_PREFIX, owner_id, day)
    }

    fn live_key(id: &LiveSessionId) -> String {
        format!("{}:{}", LIVE_KEY_PREFIX, id)
    }

    async fn write_job(&self, job: &RenderJob) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(job)?;
        let _: () = conn.set(Self::job_key(&job.id), json).await?;

        // Maintain the provider id index and the in-flight set.
        if let Some(pid) = &job.provider_video_id {
            let claimed: Option<String> = redis::cmd("SET")
                .arg(Self::provider_key(pid))
                .arg(job.id.as_str())
                .arg("NX")
                .query_async(&mut conn)
                .await?;
            if claimed.is_none() {
                let owner: Option<String> = conn.get(Self::provider_key(pid)).await?;
                if owner.as_deref() != Some(job.id.as_str()) {
                    return Err(StoreError::conflict(format!(
                        "provider video id {} already belongs to another job",
                        pid
                    )));
                }
            }
        }

        let in_flight = matches!(
            job.status,
            RenderJobStatus::Submitting | RenderJobStatus::Processing
        ) && job.provider_video_id.is_some();
        if in_flight {
            let _: () = conn.sadd(JOBS_ACTIVE_KEY, job.id.as_str()).await?;
        } else {
            let _: () = conn.srem(JOBS_ACTIVE_KEY, job.id.as_str()).await?;
        }

        Ok(())
    }

    async fn load_job(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
    ) -> StoreResult<Option<RenderJob>> {
        let json: Option<String> = conn.get(format!("{}:{}", JOB_KEY_PREFIX, id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Take the per-entry ledger lock, returning the unlock token.
    async fn acquire_usage_lock(
        &self,
        conn: &mut MultiplexedConnection,
        owner_id: &str,
        day: NaiveDate,
    ) -> StoreResult<String> {
        let lock_key = format!("{}:{}:{}", USAGE_LOCK_KEY_PREFIX, owner_id, day);
        let token = Uuid::new_v4().to_string();

        for attempt in 0..USAGE_LOCK_RETRIES {
            let result: Option<String> = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("EX")
                .arg(USAGE_LOCK_TTL_SECS)
                .query_async(conn)
                .await?;

            if result.is_some() {
                debug!(lock_key = %lock_key, attempt, "Usage ledger lock acquired");
                return Ok(token);
            }
            tokio::time::sleep(USAGE_LOCK_RETRY_DELAY).await;
        }

        Err(StoreError::lock_contention(format!(
            "usage ledger lock for {} on {} not acquired after {} attempts",
            owner_id, day, USAGE_LOCK_RETRIES
        )))
    }

    async fn release_usage_lock(
        &self,
        conn: &mut MultiplexedConnection,
        owner_id: &str,
        day: NaiveDate,
        token: &str,
    ) {
        let lock_key = format!("{}:{}:{}", USAGE_LOCK_KEY_PREFIX, owner_id, day);
        let script = Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        );
        let released: Result<i32, _> = script.key(&lock_key).arg(token).invoke_async(conn).await;
        if let Err(e) = released {
            warn!(lock_key = %lock_key, "Failed to release usage lock: {}", e);
        }
    }

    async fn load_or_new_entry(
        &self,
        conn: &mut MultiplexedConnection,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
    ) -> StoreResult<UsageLedgerEntry> {
        let json: Option<String> = conn.get(Self::usage_key(owner_id, day)).await?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(UsageLedgerEntry::new(
                owner_id,
                day,
                request_limit,
                minute_limit,
            )),
        }
    }

    async fn store_entry(
        &self,
        conn: &mut MultiplexedConnection,
        entry: &UsageLedgerEntry,
    ) -> StoreResult<()> {
        let json = serde_json::to_string(entry)?;
        let _: () = conn
            .set(Self::usage_key(&entry.owner_id, entry.date), json)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RenderJobStore for RedisStore {
    async fn create(&self, job: &RenderJob) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(Self::job_key(&job.id)).await?;
        if exists {
            return Err(StoreError::conflict(format!(
                "job {} already exists",
                job.id
            )));
        }
        self.write_job(job).await
    }

    async fn update(&self, job: &RenderJob) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(Self::job_key(&job.id)).await?;
        if !exists {
            return Err(StoreError::not_found(format!("job {}", job.id)));
        }
        self.write_job(job).await
    }

    async fn find(&self, id: &RenderJobId) -> StoreResult<Option<RenderJob>> {
        let mut conn = self.conn().await?;
        self.load_job(&mut conn, id.as_str()).await
    }

    async fn find_by_provider_id(&self, provider_video_id: &str) -> StoreResult<Option<RenderJob>> {
        let mut conn = self.conn().await?;
        let job_id: Option<String> = conn.get(Self::provider_key(provider_video_id)).await?;
        match job_id {
            Some(id) => self.load_job(&mut conn, &id).await,
            None => Ok(None),
        }
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<RenderJob>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(JOBS_ACTIVE_KEY).await?;

        let mut stale = Vec::new();
        for id in ids {
            let Some(job) = self.load_job(&mut conn, &id).await? else {
                // Job record expired or was deleted; drop the dangling member.
                let _: () = conn.srem(JOBS_ACTIVE_KEY, &id).await?;
                continue;
            };
            let in_flight = matches!(
                job.status,
                RenderJobStatus::Submitting | RenderJobStatus::Processing
            ) && job.provider_video_id.is_some();
            if in_flight && job.submitted_at.map(|t| t <= cutoff).unwrap_or(true) {
                stale.push(job);
            }
        }
        stale.sort_by_key(|j| j.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl WebhookEventStore for RedisStore {
    async fn create_if_absent(&self, event: &WebhookEvent) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(event)?;
        let created: Option<String> = redis::cmd("SET")
            .arg(Self::webhook_key(&event.provider_event_id))
            .arg(json)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(created.is_some())
    }

    async fn find(&self, provider_event_id: &str) -> StoreResult<Option<WebhookEvent>> {
        let mut conn = self.conn().await?;
        let json: Option<String> = conn.get(Self::webhook_key(provider_event_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, event: &WebhookEvent) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = Self::webhook_key(&event.provider_event_id);
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(StoreError::not_found(format!(
                "webhook event {}",
                event.provider_event_id
            )));
        }
        let json = serde_json::to_string(event)?;
        let _: () = conn.set(key, json).await?;
        Ok(())
    }
}

#[async_trait]
impl UsageLedgerStore for RedisStore {
    async fn try_consume_request(
        &self,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let mut conn = self.conn().await?;
        let token = self.acquire_usage_lock(&mut conn, owner_id, day).await?;

        let result = async {
            let mut entry = self
                .load_or_new_entry(&mut conn, owner_id, day, request_limit, minute_limit)
                .await?;
            let outcome = match entry.try_consume_request(now) {
                Ok(()) => ConsumeOutcome::Granted(entry.clone()),
                Err(rejection) => ConsumeOutcome::Rejected(rejection),
            };
            // Persist even on rejection: reaching the limit sets blocked_until.
            self.store_entry(&mut conn, &entry).await?;
            Ok(outcome)
        }
        .await;

        self.release_usage_lock(&mut conn, owner_id, day, &token)
            .await;
        result
    }

    async fn record_live_minutes(
        &self,
        owner_id: &str,
        day: NaiveDate,
        request_limit: u32,
        minute_limit: u32,
        minutes: i64,
    ) -> StoreResult<UsageLedgerEntry> {
        let mut conn = self.conn().await?;
        let token = self.acquire_usage_lock(&mut conn, owner_id, day).await?;

        let result = async {
            let mut entry = self
                .load_or_new_entry(&mut conn, owner_id, day, request_limit, minute_limit)
                .await?;
            entry.record_live_minutes(minutes);
            self.store_entry(&mut conn, &entry).await?;
            Ok(entry)
        }
        .await;

        self.release_usage_lock(&mut conn, owner_id, day, &token)
            .await;
        result
    }

    async fn find(&self, owner_id: &str, day: NaiveDate) -> StoreResult<Option<UsageLedgerEntry>> {
        let mut conn = self.conn().await?;
        let json: Option<String> = conn.get(Self::usage_key(owner_id, day)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LiveSessionStore for RedisStore {
    async fn create(&self, session: &LiveSession) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(session)?;
        let created: Option<String> = redis::cmd("SET")
            .arg(Self::live_key(&session.id))
            .arg(json)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if created.is_none() {
            return Err(StoreError::conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        Ok(())
    }

    async fn update(&self, session: &LiveSession) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = Self::live_key(&session.id);
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(StoreError::not_found(format!("session {}", session.id)));
        }
        let json = serde_json::to_string(session)?;
        let _: () = conn.set(key, json).await?;
        Ok(())
    }

    async fn find(&self, id: &LiveSessionId) -> StoreResult<Option<LiveSession>> {
        let mut conn = self.conn().await?;
        let json: Option<String> = conn.get(Self::live_key(id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> RedisStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedisStore::new(&url).expect("redis client")
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn webhook_set_nx_dedup() {
        let store = test_store();
        let id = format!("evt-{}", Uuid::new_v4());
        let event = WebhookEvent::new(&id, "avatar_video.success", true, serde_json::json!({}));

        assert!(store.create_if_absent(&event).await.unwrap());
        assert!(!store.create_if_absent(&event).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn job_provider_index_round_trip() {
        let store = test_store();
        let mut job = RenderJob::new("user-1", "a1", "v1", "hello");
        let pid = format!("p-{}", Uuid::new_v4());
        job.begin_submission().unwrap();
        job.record_submission(&pid, serde_json::json!({}), Utc::now())
            .unwrap();

        RenderJobStore::create(&store, &job).await.unwrap();
        let found = store.find_by_provider_id(&pid).await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn concurrent_consumes_serialize_under_lock() {
        let store = std::sync::Arc::new(test_store());
        let owner = format!("user-{}", Uuid::new_v4());
        let day = Utc::now().date_naive();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = std::sync::Arc::clone(&store);
            let owner = owner.clone();
            handles.push(tokio::spawn(async move {
                store.try_consume_request(&owner, day, 5, 30, now).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if let ConsumeOutcome::Granted(_) = handle.await.unwrap().unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }
}
