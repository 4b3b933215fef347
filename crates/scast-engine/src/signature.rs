//! Webhook HMAC signature verification.
//!
//! HeyGen signs the raw request body with HMAC-SHA256, either directly or
//! over `"{timestamp}.{body}"` when a timestamp header accompanies the
//! delivery. Provider docs have shipped both lowercase-hex and base64
//! digests, sometimes behind a `sha256=` style prefix, so all three forms
//! are accepted. Comparison is constant-time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header names carrying the signature, in lookup order.
pub const SIGNATURE_HEADERS: &[&str] = &["x-heygen-signature", "x-signature"];

/// Header names carrying the signature timestamp, in lookup order.
pub const TIMESTAMP_HEADERS: &[&str] = &["x-heygen-timestamp", "x-timestamp"];

/// Verify a webhook delivery.
///
/// Returns false when the secret is missing, the signature header is
/// missing, the timestamp (if present) is malformed or outside tolerance,
/// or the digest does not match.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    signature_header: Option<&str>,
    timestamp_header: Option<&str>,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(provided) = signature_header.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };

    match timestamp_header.filter(|s| !s.is_empty()) {
        Some(ts) => {
            if !ts.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            let Ok(timestamp) = ts.parse::<i64>() else {
                return false;
            };
            if (now.timestamp() - timestamp).unsigned_abs() > tolerance.as_secs() {
                return false;
            }

            let mut signed = Vec::with_capacity(ts.len() + 1 + body.len());
            signed.extend_from_slice(ts.as_bytes());
            signed.push(b'.');
            signed.extend_from_slice(body);
            matches_digest(secret, &signed, provided)
        }
        None => matches_digest(secret, body, provided),
    }
}

fn matches_digest(secret: &str, message: &[u8], provided: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(message);
    let digest = mac.finalize().into_bytes();

    let hex = hex_encode(&digest);
    let base64 = BASE64.encode(digest);

    // Anything before the first '=' is treated as a scheme prefix.
    let normalized = match provided.split_once('=') {
        Some((_, rest)) => rest,
        None => provided,
    };

    constant_time_eq(hex.as_bytes(), normalized.as_bytes())
        || constant_time_eq(base64.as_bytes(), normalized.as_bytes())
}

fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-secret";
    const BODY: &[u8] = br#"{"event_id":"evt_unit","event_type":"avatar_video.success"}"#;

    fn hex_sig(message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(message);
        hex_encode(&mac.finalize().into_bytes())
    }

    fn base64_sig(message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(message);
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn verify(sig: &str, ts: Option<&str>) -> bool {
        verify_signature(
            Some(SECRET),
            BODY,
            Some(sig),
            ts,
            Duration::from_secs(300),
            Utc::now(),
        )
    }

    #[test]
    fn valid_hex_signature_passes() {
        assert!(verify(&hex_sig(BODY), None));
    }

    #[test]
    fn prefixed_signature_passes() {
        assert!(verify(&format!("sha256={}", hex_sig(BODY)), None));
        assert!(verify(&format!("sha256={}", base64_sig(BODY)), None));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = hex_sig(BODY);
        assert!(!verify_signature(
            Some(SECRET),
            br#"{"event_id":"evt_unit","event_type":"avatar_video.fail"}"#,
            Some(&sig),
            None,
            Duration::from_secs(300),
            Utc::now(),
        ));
    }

    #[test]
    fn garbage_signature_fails() {
        assert!(!verify("invalid", None));
        assert!(!verify("", None));
    }

    #[test]
    fn missing_secret_rejects() {
        let sig = hex_sig(BODY);
        assert!(!verify_signature(
            None,
            BODY,
            Some(&sig),
            None,
            Duration::from_secs(300),
            Utc::now(),
        ));
        assert!(!verify_signature(
            Some(""),
            BODY,
            Some(&sig),
            None,
            Duration::from_secs(300),
            Utc::now(),
        ));
    }

    #[test]
    fn timestamped_signature_binds_timestamp() {
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let signed = [ts.as_bytes(), b".", BODY].concat();
        let sig = hex_sig(&signed);

        assert!(verify(&sig, Some(&ts)));
        // Signature over the bare body must not pass once a timestamp is sent.
        assert!(!verify(&hex_sig(BODY), Some(&ts)));
    }

    #[test]
    fn stale_timestamp_fails() {
        let old = Utc::now().timestamp() - 400;
        let ts = old.to_string();
        let signed = [ts.as_bytes(), b".", BODY].concat();
        assert!(!verify(&hex_sig(&signed), Some(&ts)));
    }

    #[test]
    fn non_numeric_timestamp_fails() {
        let ts = "16si90";
        let signed = [ts.as_bytes(), b".", BODY].concat();
        assert!(!verify(&hex_sig(&signed), Some(ts)));
    }
}
