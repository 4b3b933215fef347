//! Read-through cache over the provider's avatar and voice catalogs.
//!
//! Catalog listings change rarely and the provider rate-limits them, so
//! results are cached in process for a TTL (15 minutes by default).

use std::sync::Arc;
use std::time::{Duration, Instant};

use scast_heygen::HeyGenApi;
use scast_models::extract_catalog_items;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::EngineResult;

struct CachedList {
    fetched_at: Instant,
    items: Vec<Value>,
}

#[derive(Clone)]
pub struct CatalogService {
    provider: Arc<dyn HeyGenApi>,
    ttl: Duration,
    avatars: Arc<Mutex<Option<CachedList>>>,
    voices: Arc<Mutex<Option<CachedList>>>,
}

impl CatalogService {
    pub fn new(provider: Arc<dyn HeyGenApi>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            avatars: Arc::new(Mutex::new(None)),
            voices: Arc::new(Mutex::new(None)),
        }
    }

    /// Available avatars, cached.
    pub async fn avatars(&self) -> EngineResult<Vec<Value>> {
        let mut cache = self.avatars.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!("Avatar catalog cache hit");
                return Ok(cached.items.clone());
            }
        }

        let response = self.provider.list_avatars().await?;
        let items = extract_catalog_items(&response);
        *cache = Some(CachedList {
            fetched_at: Instant::now(),
            items: items.clone(),
        });
        Ok(items)
    }

    /// Available voices, cached.
    pub async fn voices(&self) -> EngineResult<Vec<Value>> {
        let mut cache = self.voices.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!("Voice catalog cache hit");
                return Ok(cached.items.clone());
            }
        }

        let response = self.provider.list_voices().await?;
        let items = extract_catalog_items(&response);
        *cache = Some(CachedList {
            fetched_at: Instant::now(),
            items: items.clone(),
        });
        Ok(items)
    }
}
