//! Engine configuration.

use std::time::Duration;

/// Tunables for the orchestration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared secret for webhook HMAC verification; unset rejects all webhooks
    pub webhook_secret: Option<String>,
    /// Accepted clock skew for timestamped signatures
    pub timestamp_tolerance: Duration,
    /// Age after which an in-flight job is reconciled
    pub reconcile_staleness: Duration,
    /// Jobs polled per reconciliation batch
    pub reconcile_batch_size: usize,
    /// Daily render requests per user
    pub daily_request_limit: u32,
    /// Daily live session minutes per user
    pub daily_minute_limit: u32,
    /// Maximum script length in characters
    pub script_max_chars: usize,
    /// Case-insensitive substrings rejected in scripts
    pub script_blocklist: Vec<String>,
    /// Catalog cache lifetime
    pub catalog_ttl: Duration,
    /// Timeout for downloading provider output
    pub download_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            timestamp_tolerance: Duration::from_secs(300),
            reconcile_staleness: Duration::from_secs(180),
            reconcile_batch_size: 50,
            daily_request_limit: 5,
            daily_minute_limit: 30,
            script_max_chars: 1500,
            script_blocklist: Vec::new(),
            catalog_ttl: Duration::from_secs(900),
            download_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            webhook_secret: std::env::var("HEYGEN_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            timestamp_tolerance: Duration::from_secs(
                env_parse("WEBHOOK_TIMESTAMP_TOLERANCE_SECS", 300),
            ),
            reconcile_staleness: Duration::from_secs(env_parse("RECONCILE_STALENESS_SECS", 180)),
            reconcile_batch_size: env_parse("RECONCILE_BATCH_SIZE", 50),
            daily_request_limit: env_parse("DAILY_REQUEST_LIMIT", 5),
            daily_minute_limit: env_parse("DAILY_MINUTE_LIMIT", 30),
            script_max_chars: env_parse("SCRIPT_MAX_CHARS", 1500),
            script_blocklist: std::env::var("SCRIPT_BLOCKLIST")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.script_blocklist),
            catalog_ttl: Duration::from_secs(env_parse("CATALOG_TTL_SECS", 900)),
            download_timeout: Duration::from_secs(env_parse("ARCHIVE_DOWNLOAD_TIMEOUT_SECS", 30)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
