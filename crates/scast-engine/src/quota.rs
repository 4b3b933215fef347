//! Per-user daily quota service.

use std::sync::Arc;

use chrono::Utc;
use scast_models::{QuotaRejection, UsageLedgerEntry};
use scast_store::{ConsumeOutcome, UsageLedgerStore};
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Gates render submissions and accounts live-session minutes against the
/// daily usage ledger.
#[derive(Clone)]
pub struct QuotaService {
    usage: Arc<dyn UsageLedgerStore>,
    request_limit: u32,
    minute_limit: u32,
}

impl QuotaService {
    pub fn new(usage: Arc<dyn UsageLedgerStore>, request_limit: u32, minute_limit: u32) -> Self {
        Self {
            usage,
            request_limit,
            minute_limit,
        }
    }

    /// Consume one render request for today, or reject.
    pub async fn consume_video_request(&self, owner_id: &str) -> EngineResult<UsageLedgerEntry> {
        let now = Utc::now();
        let day = now.date_naive();

        let outcome = self
            .usage
            .try_consume_request(owner_id, day, self.request_limit, self.minute_limit, now)
            .await?;

        match outcome {
            ConsumeOutcome::Granted(entry) => {
                info!(
                    owner_id = %owner_id,
                    used = entry.video_requests,
                    limit = entry.daily_request_limit,
                    "Render request admitted"
                );
                Ok(entry)
            }
            ConsumeOutcome::Rejected(QuotaRejection::Blocked { until }) => {
                Err(EngineError::QuotaBlocked { until })
            }
            ConsumeOutcome::Rejected(QuotaRejection::Exceeded) => Err(EngineError::QuotaExceeded),
        }
    }

    /// Record live-session minutes on today's ledger.
    pub async fn record_live_minutes(
        &self,
        owner_id: &str,
        minutes: i64,
    ) -> EngineResult<UsageLedgerEntry> {
        let day = Utc::now().date_naive();
        let entry = self
            .usage
            .record_live_minutes(owner_id, day, self.request_limit, self.minute_limit, minutes)
            .await?;
        Ok(entry)
    }

    /// Today's ledger entry for an owner, if any usage was recorded.
    pub async fn today(&self, owner_id: &str) -> EngineResult<Option<UsageLedgerEntry>> {
        let day = Utc::now().date_naive();
        Ok(self.usage.find(owner_id, day).await?)
    }
}
