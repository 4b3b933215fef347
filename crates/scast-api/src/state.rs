//! Application state.

use std::sync::Arc;

use scast_engine::{
    EngineConfig, IntakeService, QuotaService, ScriptPolicy, WebhookService,
};
use scast_queue::{TaskDispatcher, TaskQueue};
use scast_store::{RedisStore, RenderJobStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<dyn RenderJobStore>,
    pub queue: Arc<TaskQueue>,
    pub intake: IntakeService,
    pub webhook: WebhookService,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let engine_config = EngineConfig::from_env();

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let store = Arc::new(RedisStore::new(&redis_url)?);

        let queue = Arc::new(TaskQueue::from_env()?);
        let dispatcher: Arc<dyn TaskDispatcher> = queue.clone();

        let quota = QuotaService::new(
            store.clone(),
            engine_config.daily_request_limit,
            engine_config.daily_minute_limit,
        );
        let script_policy = ScriptPolicy::new(
            engine_config.script_max_chars,
            engine_config.script_blocklist.clone(),
        );

        let jobs: Arc<dyn RenderJobStore> = store.clone();
        let intake = IntakeService::new(
            jobs.clone(),
            dispatcher.clone(),
            quota,
            script_policy,
        );
        let webhook = WebhookService::new(
            store.clone(),
            store.clone(),
            dispatcher,
            engine_config,
        );

        Ok(Self {
            config,
            jobs,
            queue,
            intake,
            webhook,
        })
    }
}
