//! Per-user daily usage ledger.
//!
//! One `UsageLedgerEntry` exists per (owner, calendar day). The consume
//! decision itself is a pure function here; the store backends are
//! responsible for running it under per-entry mutual exclusion so two
//! concurrent requests can never both read "under limit" and both be
//! admitted.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a video-request consume was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaRejection {
    #[error("Video generation is temporarily blocked for this account")]
    Blocked { until: DateTime<Utc> },

    #[error("Daily video request quota reached")]
    Exceeded,
}

/// Usage counters for one (owner, day).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UsageLedgerEntry {
    /// Owning user
    pub owner_id: String,
    /// Calendar day the counters apply to (UTC)
    pub date: NaiveDate,
    /// Video render requests consumed today
    pub video_requests: u32,
    /// Live session minutes recorded today
    pub live_session_minutes: u32,
    /// Daily render request limit captured at entry creation
    pub daily_request_limit: u32,
    /// Daily live-session minute limit captured at entry creation
    pub daily_minute_limit: u32,
    /// While set and in the future, all consumes are rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl UsageLedgerEntry {
    /// Create a fresh entry for the given day with configured limits.
    pub fn new(
        owner_id: impl Into<String>,
        date: NaiveDate,
        daily_request_limit: u32,
        daily_minute_limit: u32,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            date,
            video_requests: 0,
            live_session_minutes: 0,
            daily_request_limit,
            daily_minute_limit,
            blocked_until: None,
        }
    }

    /// Remaining render requests today.
    pub fn remaining_requests(&self) -> u32 {
        self.daily_request_limit.saturating_sub(self.video_requests)
    }

    /// Attempt to consume one video request.
    ///
    /// Must be called with the entry exclusively held. On reaching the limit
    /// the entry is blocked until the end of its day, so subsequent requests
    /// fail fast without re-counting.
    pub fn try_consume_request(&mut self, now: DateTime<Utc>) -> Result<(), QuotaRejection> {
        if let Some(until) = self.blocked_until {
            if until > now {
                return Err(QuotaRejection::Blocked { until });
            }
        }

        if self.video_requests >= self.daily_request_limit {
            self.blocked_until = Some(end_of_day(self.date));
            return Err(QuotaRejection::Exceeded);
        }

        self.video_requests += 1;
        Ok(())
    }

    /// Record live-session minutes, clamped to non-negative input.
    pub fn record_live_minutes(&mut self, minutes: i64) {
        self.live_session_minutes = self
            .live_session_minutes
            .saturating_add(minutes.max(0) as u32);
    }
}

/// Last instant of a UTC calendar day.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    // and_hms_opt(23, 59, 59) is always Some for a valid date.
    let eod = date.and_hms_opt(23, 59, 59).unwrap_or_default();
    Utc.from_utc_datetime(&eod)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry() -> UsageLedgerEntry {
        UsageLedgerEntry::new("user-1", Utc::now().date_naive(), 3, 30)
    }

    #[test]
    fn consume_up_to_limit_then_exceeded() {
        let mut e = entry();
        let now = Utc::now();

        for i in 1..=3 {
            e.try_consume_request(now).unwrap();
            assert_eq!(e.video_requests, i);
        }

        assert_eq!(e.try_consume_request(now), Err(QuotaRejection::Exceeded));
        assert_eq!(e.video_requests, 3);
        // The rejection blocks the rest of the day.
        let until = e.blocked_until.expect("blocked_until set");
        assert!(until >= now);
    }

    #[test]
    fn blocked_entry_rejects_before_counting() {
        let mut e = entry();
        let now = Utc::now();
        e.blocked_until = Some(now + Duration::hours(1));

        match e.try_consume_request(now) {
            Err(QuotaRejection::Blocked { until }) => assert!(until > now),
            other => panic!("expected blocked rejection, got {other:?}"),
        }
        assert_eq!(e.video_requests, 0);
    }

    #[test]
    fn expired_block_is_ignored() {
        let mut e = entry();
        let now = Utc::now();
        e.blocked_until = Some(now - Duration::hours(1));

        e.try_consume_request(now).unwrap();
        assert_eq!(e.video_requests, 1);
    }

    #[test]
    fn live_minutes_clamp_negative() {
        let mut e = entry();
        e.record_live_minutes(12);
        e.record_live_minutes(-5);
        assert_eq!(e.live_session_minutes, 12);
    }

    #[test]
    fn end_of_day_is_last_second() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 26).unwrap();
        let eod = end_of_day(date);
        assert_eq!(eod.to_rfc3339(), "2026-02-26T23:59:59+00:00");
    }
}
