//! Durable object storage.
//!
//! An `ObjectStore` trait with a Cloudflare R2 (S3 API) production backend
//! and an in-memory backend for tests, plus archive key construction.

pub mod client;
pub mod error;
pub mod keys;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{archive_key, extension_from_url, sanitize_base_name, ARCHIVE_PREFIX};
pub use store::{MemoryObjectStore, ObjectStore};
