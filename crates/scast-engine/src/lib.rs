//! Core orchestration engine.
//!
//! Everything between the HTTP surface and the stores: render request
//! intake, provider submission, webhook ingestion and processing,
//! reconciliation of lost webhooks, the daily quota ledger, exactly-once
//! output archival, and the provider catalog cache.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod intake;
pub mod live;
pub mod metrics;
pub mod quota;
pub mod reconcile;
pub mod retry;
pub mod script;
pub mod signature;
pub mod submit;
pub mod webhook;

pub use archive::ArchiveService;
pub use catalog::CatalogService;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use intake::IntakeService;
pub use live::LiveService;
pub use quota::QuotaService;
pub use reconcile::{ReconcileReport, ReconcileService};
pub use retry::{retry_async, RetryConfig};
pub use script::ScriptPolicy;
pub use signature::{verify_signature, SIGNATURE_HEADERS, TIMESTAMP_HEADERS};
pub use submit::SubmitService;
pub use webhook::{IngestOutcome, WebhookService};
