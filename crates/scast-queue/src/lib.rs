//! Redis Streams task queue.
//!
//! This crate provides:
//! - Task enqueueing via Redis Streams with idempotency-key deduplication
//! - Worker consumption with retry/DLQ
//! - A dispatch trait so callers stay testable without Redis

pub mod dispatch;
pub mod error;
pub mod queue;
pub mod task;

pub use dispatch::{MemoryDispatcher, TaskDispatcher};
pub use error::{QueueError, QueueResult};
pub use queue::{QueueConfig, TaskQueue};
pub use task::{ArchiveRenderTask, ProcessWebhookTask, QueueTask, SubmitRenderTask};
