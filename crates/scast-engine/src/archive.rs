//! Exactly-once archival of completed renders.
//!
//! Provider CDN URLs expire, so a completed job's output is copied into our
//! own object storage once. The storage URL field on the job is the
//! write-once marker: a rerun of the task sees it set and does nothing.

use std::sync::Arc;
use std::time::Duration;

use scast_models::{RenderJobId, TransitionError};
use scast_storage::{archive_key, ObjectStore};
use scast_store::RenderJobStore;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::retry::{retry_async, RetryConfig};

#[derive(Clone)]
pub struct ArchiveService {
    jobs: Arc<dyn RenderJobStore>,
    objects: Arc<dyn ObjectStore>,
    http: reqwest::Client,
}

impl ArchiveService {
    pub fn new(
        jobs: Arc<dyn RenderJobStore>,
        objects: Arc<dyn ObjectStore>,
        download_timeout: Duration,
    ) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| EngineError::download_failed(e.to_string()))?;
        Ok(Self { jobs, objects, http })
    }

    /// Archive one job's output. No-ops when there is nothing to do; fails
    /// retryably on download or upload trouble.
    pub async fn archive(&self, job_id: &RenderJobId) -> EngineResult<()> {
        let Some(mut job) = self.jobs.find(job_id).await? else {
            warn!(job_id = %job_id, "Archive task for unknown job");
            return Ok(());
        };

        if job.output_storage_url.is_some() {
            info!(job_id = %job.id, "Output already archived");
            return Ok(());
        }

        let Some(source_url) = job
            .output_provider_url
            .clone()
            .filter(|u| !u.is_empty())
        else {
            info!(job_id = %job.id, "No provider output URL to archive");
            return Ok(());
        };

        let base_name = job
            .provider_video_id
            .clone()
            .unwrap_or_else(|| job.id.to_string());
        let key = archive_key(&base_name, &source_url);

        let (bytes, content_type) = self.download(&source_url).await?;
        let stored_url = self.objects.put_bytes(&key, bytes, &content_type).await?;

        match job.record_storage_url(&stored_url) {
            Ok(()) => {}
            // A concurrent run won the write; the object is the same key.
            Err(TransitionError::AlreadyArchived) => {
                info!(job_id = %job.id, "Output archived by a concurrent run");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.jobs.update(&job).await?;

        metrics::record_archive("stored");
        info!(job_id = %job.id, key = %key, "Output archived");
        Ok(())
    }

    async fn download(&self, url: &str) -> EngineResult<(Vec<u8>, String)> {
        let retry = RetryConfig::new("archive_download");

        let response = retry_async(&retry, || async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| EngineError::download_failed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(EngineError::download_failed(format!(
                    "source returned {}",
                    response.status()
                )));
            }
            Ok(response)
        })
        .await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::download_failed(e.to_string()))?
            .to_vec();

        Ok((bytes, content_type))
    }
}
