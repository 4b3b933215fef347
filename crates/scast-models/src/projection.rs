//! Provider status projection.
//!
//! HeyGen's payload shapes are loosely typed: fields appear flat, under a
//! `data` envelope, or nested under a `video` object, and have drifted
//! between API versions. All "look for this key under several aliases"
//! parsing is confined to this module as explicit ordered rule lists, so
//! provider shape drift is a one-place change.

use serde_json::Value;

/// Aliases for the status field, relative to the unwrapped payload.
const STATUS_ALIASES: &[&str] = &["status", "video.status"];

/// Aliases for the rendered output URL.
const VIDEO_URL_ALIASES: &[&str] = &["video_url", "url", "video.video_url"];

/// Aliases for the provider-side video ID.
const PROVIDER_VIDEO_ID_ALIASES: &[&str] = &["video_id", "id", "video.video_id"];

/// Aliases for the webhook event ID, relative to the payload root.
const EVENT_ID_ALIASES: &[&str] = &["event_id", "id"];

/// Aliases for the webhook event type, relative to the payload root.
const EVENT_TYPE_ALIASES: &[&str] = &["event_type", "type"];

/// Normalized provider status for a render job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectedStatus {
    /// Provider reports the render finished successfully.
    Completed { video_url: Option<String> },
    /// Provider reports the render failed.
    Failed {
        error_code: String,
        error_message: String,
    },
    /// Anything else: still rendering, or an intermediate/unknown state.
    Processing,
}

/// Unwrap the `data` envelope if present, otherwise use the payload as-is.
/// The envelope may be an object or, for catalog listings, a bare array.
fn payload_data(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(data) if data.is_object() || data.is_array() => data,
        _ => payload,
    }
}

/// Walk a dotted path (`"video.status"`) through nested objects.
fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Coerce a JSON leaf to a non-empty string. Numbers are stringified since
/// the provider has shipped numeric IDs in some payload versions.
fn as_non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Return the first present, non-empty match among the alias paths.
fn extract_first(value: &Value, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|path| lookup_path(value, path))
        .find_map(as_non_empty_string)
}

/// Project a raw provider status payload onto a normalized status.
///
/// Case-folded `completed`/`success` map to Completed, `failed`/`error` map
/// to Failed; everything else (including a missing status field) is treated
/// as still processing so unknown intermediate states are never failures.
pub fn project_status(payload: &Value) -> ProjectedStatus {
    let data = payload_data(payload);

    let status = extract_first(data, STATUS_ALIASES)
        .unwrap_or_default()
        .to_lowercase();

    match status.as_str() {
        "completed" | "success" => ProjectedStatus::Completed {
            video_url: extract_first(data, VIDEO_URL_ALIASES),
        },
        "failed" | "error" => ProjectedStatus::Failed {
            error_code: extract_first(data, &["error_code"])
                .unwrap_or_else(|| "provider_failed".to_string()),
            error_message: extract_first(data, &["error_message", "message"])
                .unwrap_or_else(|| "Avatar video generation failed.".to_string()),
        },
        _ => ProjectedStatus::Processing,
    }
}

/// Extract the provider-side video ID from a submission response or a
/// webhook payload.
pub fn extract_provider_video_id(payload: &Value) -> Option<String> {
    extract_first(payload_data(payload), PROVIDER_VIDEO_ID_ALIASES)
}

/// Extract the webhook event ID, if the provider included one.
pub fn extract_event_id(payload: &Value) -> Option<String> {
    extract_first(payload, EVENT_ID_ALIASES)
}

/// Extract the webhook event type, defaulting to `unknown`.
pub fn extract_event_type(payload: &Value) -> String {
    extract_first(payload, EVENT_TYPE_ALIASES).unwrap_or_else(|| "unknown".to_string())
}

/// Extract catalog items (avatars or voices) from a listing response.
///
/// Tolerates `data.items`, a bare list under `data`, and the legacy
/// `data.avatars` / `data.voices` shapes.
pub fn extract_catalog_items(response: &Value) -> Vec<Value> {
    let data = payload_data(response);

    for key in ["items", "avatars", "voices"] {
        if let Some(Value::Array(items)) = data.get(key) {
            return items.iter().filter(|v| v.is_object()).cloned().collect();
        }
    }

    if let Value::Array(items) = data {
        return items.iter().filter(|v| v.is_object()).cloned().collect();
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_status_with_flat_url() {
        let payload = json!({"data": {"status": "completed", "video_url": "https://cdn/x.mp4"}});
        assert_eq!(
            project_status(&payload),
            ProjectedStatus::Completed {
                video_url: Some("https://cdn/x.mp4".into())
            }
        );
    }

    #[test]
    fn success_is_case_folded() {
        let payload = json!({"status": "SUCCESS", "url": "https://cdn/y.mp4"});
        assert_eq!(
            project_status(&payload),
            ProjectedStatus::Completed {
                video_url: Some("https://cdn/y.mp4".into())
            }
        );
    }

    #[test]
    fn nested_video_object_shape() {
        let payload = json!({"data": {"video": {"status": "completed", "video_url": "https://cdn/z.mp4"}}});
        assert_eq!(
            project_status(&payload),
            ProjectedStatus::Completed {
                video_url: Some("https://cdn/z.mp4".into())
            }
        );
    }

    #[test]
    fn failed_status_with_defaults() {
        let payload = json!({"data": {"status": "error"}});
        match project_status(&payload) {
            ProjectedStatus::Failed {
                error_code,
                error_message,
            } => {
                assert_eq!(error_code, "provider_failed");
                assert!(!error_message.is_empty());
            }
            other => panic!("unexpected projection: {other:?}"),
        }
    }

    #[test]
    fn failed_status_with_explicit_fields() {
        let payload = json!({
            "data": {"status": "failed", "error_code": "no_credit", "error_message": "out of credit"}
        });
        assert_eq!(
            project_status(&payload),
            ProjectedStatus::Failed {
                error_code: "no_credit".into(),
                error_message: "out of credit".into(),
            }
        );
    }

    #[test]
    fn unknown_status_is_processing() {
        for status in ["pending", "waiting", "rendering", ""] {
            let payload = json!({"data": {"status": status}});
            assert_eq!(project_status(&payload), ProjectedStatus::Processing);
        }
        assert_eq!(project_status(&json!({})), ProjectedStatus::Processing);
    }

    #[test]
    fn provider_video_id_alias_order() {
        let payload = json!({"data": {"video_id": "p-1", "id": "other"}});
        assert_eq!(extract_provider_video_id(&payload), Some("p-1".into()));

        let payload = json!({"data": {"id": "p-2"}});
        assert_eq!(extract_provider_video_id(&payload), Some("p-2".into()));

        let payload = json!({"video_id": "p-3"});
        assert_eq!(extract_provider_video_id(&payload), Some("p-3".into()));

        let payload = json!({"data": {"video": {"video_id": "p-4"}}});
        assert_eq!(extract_provider_video_id(&payload), Some("p-4".into()));
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let payload = json!({"data": {"video_id": 42}});
        assert_eq!(extract_provider_video_id(&payload), Some("42".into()));
    }

    #[test]
    fn event_id_and_type_extraction() {
        let payload = json!({"event_id": "evt-1", "event_type": "avatar_video.success"});
        assert_eq!(extract_event_id(&payload), Some("evt-1".into()));
        assert_eq!(extract_event_type(&payload), "avatar_video.success");

        let payload = json!({"id": "evt-2", "type": "avatar_video.fail"});
        assert_eq!(extract_event_id(&payload), Some("evt-2".into()));
        assert_eq!(extract_event_type(&payload), "avatar_video.fail");

        let payload = json!({"data": {}});
        assert_eq!(extract_event_id(&payload), None);
        assert_eq!(extract_event_type(&payload), "unknown");
    }

    #[test]
    fn catalog_items_shapes() {
        let items = extract_catalog_items(&json!({"data": {"items": [{"avatar_id": "a1"}, "junk"]}}));
        assert_eq!(items.len(), 1);

        let items = extract_catalog_items(&json!({"data": [{"voice_id": "v1"}, {"voice_id": "v2"}]}));
        assert_eq!(items.len(), 2);

        let items = extract_catalog_items(&json!({"data": {"avatars": [{"avatar_id": "a1"}]}}));
        assert_eq!(items.len(), 1);

        let items = extract_catalog_items(&json!([{"voice_id": "v1"}]));
        assert_eq!(items.len(), 1);

        assert!(extract_catalog_items(&json!({"data": {}})).is_empty());
    }
}
