//! HeyGen REST API client.
//!
//! A thin, typed boundary to the avatar rendering provider. The client owns
//! the timeout and transient-retry policy; everything above it consumes the
//! [`HeyGenApi`] trait so workflows can be tested against a mock.

pub mod client;
pub mod error;

pub use client::{HeyGenApi, HeyGenClient, HeyGenConfig, MockHeyGenApi};
pub use error::{HeyGenError, HeyGenResult};
