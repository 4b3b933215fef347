//! Shared service wiring for task handlers.

use std::sync::Arc;

use scast_engine::{
    ArchiveService, EngineConfig, ReconcileService, SubmitService, WebhookService,
};
use scast_heygen::{HeyGenApi, HeyGenClient};
use scast_queue::{TaskDispatcher, TaskQueue};
use scast_storage::{ObjectStore, R2Client};
use scast_store::RedisStore;

use crate::error::WorkerResult;

/// Services the executor routes tasks to.
pub struct WorkerContext {
    pub submit: SubmitService,
    pub webhook: WebhookService,
    pub archive: ArchiveService,
    pub reconcile: ReconcileService,
}

impl WorkerContext {
    /// Wire up services against Redis, the render provider, and object storage.
    pub async fn new(queue: Arc<TaskQueue>) -> WorkerResult<Self> {
        let engine_config = EngineConfig::from_env();

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let store = Arc::new(RedisStore::new(&redis_url)?);

        let provider: Arc<dyn HeyGenApi> = Arc::new(HeyGenClient::from_env()?);
        let objects: Arc<dyn ObjectStore> = Arc::new(R2Client::from_env().await?);
        let dispatcher: Arc<dyn TaskDispatcher> = queue;

        Ok(Self {
            submit: SubmitService::new(store.clone(), provider.clone()),
            webhook: WebhookService::new(
                store.clone(),
                store.clone(),
                dispatcher.clone(),
                engine_config.clone(),
            ),
            archive: ArchiveService::new(
                store.clone(),
                objects,
                engine_config.download_timeout,
            )?,
            reconcile: ReconcileService::new(store, provider, dispatcher, engine_config),
        })
    }
}
