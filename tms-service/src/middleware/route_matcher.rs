//! Request path normalization for rate-limit keys and logging
//!
//! Collapses path segments that identify a specific resource (UUIDs,
//! numeric IDs) down to a `{id}` placeholder, so per-route metrics and
//! rate-limit keys group `/conversations/abc-123` and
//! `/conversations/def-456` together instead of treating every resource
//! as its own route.

use std::sync::LazyLock;

use regex::Regex;

/// Regex for matching UUIDs in paths
static UUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("UUID regex is valid")
});

/// Normalize a request path by replacing dynamic segments with `{id}`
///
/// # Examples
/// ```ignore
/// normalize_path("/api/v1/users/123") // -> "/api/v1/users/{id}"
/// normalize_path("/api/v1/docs/550e8400-e29b-41d4-a716-446655440000") // -> "/api/v1/docs/{id}"
/// ```
pub fn normalize_path(path: &str) -> String {
    let normalized = UUID_REGEX.replace_all(path, "{id}");

    let segments: Vec<&str> = normalized.split('/').collect();
    let normalized_segments: Vec<String> = segments
        .iter()
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();

    normalized_segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuids() {
        assert_eq!(
            normalize_path("/api/v1/users/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/users/{id}"
        );
    }

    #[test]
    fn test_normalize_path_numeric_ids() {
        assert_eq!(normalize_path("/api/v1/users/123"), "/api/v1/users/{id}");
        assert_eq!(
            normalize_path("/api/v1/users/123/posts/456"),
            "/api/v1/users/{id}/posts/{id}"
        );
    }

    #[test]
    fn test_normalize_path_preserves_version() {
        assert_eq!(normalize_path("/api/v1/users"), "/api/v1/users");
        assert_eq!(normalize_path("/api/v2/users/123"), "/api/v2/users/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/users"), "/api/v1/users");
        assert_eq!(normalize_path("/health"), "/health");
    }
}
