//! Axum HTTP API server.
//!
//! This crate provides:
//! - Provider webhook ingestion endpoint (202/401 mapping)
//! - Render submission and status endpoints
//! - Health and readiness probes
//!
//! Authentication is an upstream concern; handlers read the caller
//! identity from a forwarded header.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
