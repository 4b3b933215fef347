//! Render orchestration worker.
//!
//! This crate provides:
//! - Task executor for submit/webhook/archive tasks
//! - Periodic reconciliation sweep
//! - Graceful shutdown

pub mod config;
pub mod context;
pub mod error;
pub mod executor;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::TaskExecutor;
