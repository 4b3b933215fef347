//! Metric names and recording helpers.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const WEBHOOKS_ACCEPTED_TOTAL: &str = "scast_webhooks_accepted_total";
    pub const WEBHOOKS_REJECTED_TOTAL: &str = "scast_webhooks_rejected_total";
    pub const WEBHOOKS_DUPLICATE_TOTAL: &str = "scast_webhooks_duplicate_total";

    pub const SUBMISSIONS_TOTAL: &str = "scast_submissions_total";
    pub const RECONCILE_CHECKED_TOTAL: &str = "scast_reconcile_checked_total";
    pub const RECONCILE_REPAIRED_TOTAL: &str = "scast_reconcile_repaired_total";
    pub const RECONCILE_FAILED_TOTAL: &str = "scast_reconcile_failed_total";
    pub const ARCHIVES_TOTAL: &str = "scast_archives_total";
}

pub fn record_webhook_accepted() {
    counter!(names::WEBHOOKS_ACCEPTED_TOTAL).increment(1);
}

pub fn record_webhook_rejected() {
    counter!(names::WEBHOOKS_REJECTED_TOTAL).increment(1);
}

pub fn record_webhook_duplicate() {
    counter!(names::WEBHOOKS_DUPLICATE_TOTAL).increment(1);
}

pub fn record_submission(outcome: &str) {
    counter!(names::SUBMISSIONS_TOTAL, &[("outcome", outcome.to_string())]).increment(1);
}

pub fn record_reconcile_checked(count: u64) {
    counter!(names::RECONCILE_CHECKED_TOTAL).increment(count);
}

pub fn record_reconcile_repaired() {
    counter!(names::RECONCILE_REPAIRED_TOTAL).increment(1);
}

pub fn record_reconcile_failed() {
    counter!(names::RECONCILE_FAILED_TOTAL).increment(1);
}

pub fn record_archive(outcome: &str) {
    counter!(names::ARCHIVES_TOTAL, &[("outcome", outcome.to_string())]).increment(1);
}
