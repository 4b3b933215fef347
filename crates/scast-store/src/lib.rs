//! Persistence layer.
//!
//! Trait seams over render jobs, webhook events, the usage ledger and live
//! sessions, with a Redis production backend and an in-memory backend for
//! tests.

pub mod error;
pub mod memory;
pub mod redis;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryJobStore, MemoryLiveSessionStore, MemoryUsageStore, MemoryWebhookStore};
pub use self::redis::RedisStore;
pub use traits::{
    ConsumeOutcome, LiveSessionStore, RenderJobStore, UsageLedgerStore, WebhookEventStore,
};
