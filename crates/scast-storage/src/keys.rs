//! Archive object key construction.

use url::Url;

/// Prefix under which archived provider videos land.
pub const ARCHIVE_PREFIX: &str = "heygen/videos";

/// File extension used when the source URL does not carry one.
const DEFAULT_EXTENSION: &str = "mp4";

/// Strip a base name down to characters safe in an object key.
///
/// Anything outside `[A-Za-z0-9_-]` is dropped; an empty result falls back
/// to `video`.
pub fn sanitize_base_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

/// Take the file extension from a source URL's path, ignoring query strings.
pub fn extension_from_url(source_url: &str) -> String {
    let path = match Url::parse(source_url) {
        Ok(url) => url.path().to_string(),
        // Not an absolute URL; treat the whole string as a path.
        Err(_) => source_url.split(['?', '#']).next().unwrap_or("").to_string(),
    };

    let file_name = path.rsplit('/').next().unwrap_or("");
    match file_name.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Deterministic archive key for a render output.
///
/// The same (base name, source URL) always yields the same key, so a rerun
/// of the archive task targets the same object.
pub fn archive_key(base_name: &str, source_url: &str) -> String {
    format!(
        "{}/{}.{}",
        ARCHIVE_PREFIX,
        sanitize_base_name(base_name),
        extension_from_url(source_url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_base_name("job 42/../etc"), "job42etc");
        assert_eq!(sanitize_base_name("p-123_v2"), "p-123_v2");
        assert_eq!(sanitize_base_name("!!!"), "video");
    }

    #[test]
    fn extension_comes_from_url_path() {
        assert_eq!(extension_from_url("https://cdn/x.mp4"), "mp4");
        assert_eq!(extension_from_url("https://cdn/x.webm?sig=abc.def"), "webm");
        assert_eq!(extension_from_url("https://cdn/stream"), "mp4");
        assert_eq!(extension_from_url("https://cdn/x.MOV"), "mov");
    }

    #[test]
    fn archive_key_is_deterministic() {
        let a = archive_key("p-123", "https://cdn/x.mp4");
        let b = archive_key("p-123", "https://cdn/x.mp4");
        assert_eq!(a, b);
        assert_eq!(a, "heygen/videos/p-123.mp4");
    }
}
