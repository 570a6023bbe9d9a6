//! URI and naming helpers shared by the object-store and warehouse
//! implementations.

use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind};

// ============================================================================
// Resource Identifier Parsing
// ============================================================================

/// Parse a resource identifier from a URI-like string
///
/// # Examples
/// - `gs://bucket-name/key` -> `("gs", ["bucket-name", "key"])`
/// - `file://bucket/a/b.jsonl.gz` -> `("file", ["bucket", "a", "b.jsonl.gz"])`
///
/// # Errors
///
/// Returns an error if the URI format is invalid (missing `://` separator)
pub fn parse_resource_uri(uri: &str) -> CloudResult<(String, Vec<String>)> {
    let Some((provider, rest)) = uri.split_once("://") else {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("Invalid resource URI format: {uri}"),
        ));
    };

    let path_parts: Vec<String> = rest.split('/').map(ToString::to_string).collect();
    Ok((provider.to_string(), path_parts))
}

/// Split an object URI into `(scheme, bucket, key)`.
///
/// # Errors
///
/// Returns an error if the URI has no scheme, no bucket, or no key
pub fn split_object_uri(uri: &str) -> CloudResult<(String, String, String)> {
    let (scheme, parts) = parse_resource_uri(uri)?;
    match parts.split_first() {
        Some((bucket, key_parts)) if !bucket.is_empty() && !key_parts.is_empty() => {
            let key = key_parts.join("/");
            validate_key_path(&key)?;
            Ok((scheme, bucket.clone(), key))
        }
        _ => Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("Object URI needs a bucket and a key: {uri}"),
        )),
    }
}

/// Join a key prefix and a relative path with exactly one `/` between them.
/// Backslashes in `relative` are normalised to `/`.
#[must_use]
pub fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Normalise a listing prefix so that it ends with `/` (empty stays empty).
#[must_use]
pub fn folder_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate a resource name according to common cloud provider rules
///
/// # Errors
///
/// Returns an error if:
/// - The resource name is empty
/// - The resource name exceeds 255 characters
/// - The resource name contains invalid characters (only alphanumeric, hyphens, underscores, and periods are allowed)
pub fn validate_resource_name(name: &str) -> CloudResult<()> {
    if name.is_empty() {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Resource name cannot be empty",
        ));
    }

    if name.len() > 255 {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Resource name too long (max 255 characters)",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("Resource name contains invalid characters: {name}"),
        ));
    }

    Ok(())
}

/// Validate a key path (for object storage, etc.)
///
/// # Errors
///
/// Returns an error if:
/// - The key path is empty
/// - The key path starts with a forward slash
/// - A path segment is `..`
pub fn validate_key_path(path: &str) -> CloudResult<()> {
    if path.is_empty() {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Key path cannot be empty",
        ));
    }

    if path.starts_with('/') {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Key path cannot start with '/'",
        ));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("Key path cannot contain '..': {path}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_uri() {
        let (provider, parts) = parse_resource_uri("gs://my-bucket/my-key").unwrap();
        assert_eq!(provider, "gs");
        assert_eq!(parts, vec!["my-bucket", "my-key"]);
        assert!(parse_resource_uri("no-scheme/here").is_err());
    }

    #[test]
    fn test_split_object_uri() {
        let (scheme, bucket, key) =
            split_object_uri("file://crossref/processed_for_bq/2024/0.jsonl.gz").unwrap();
        assert_eq!(scheme, "file");
        assert_eq!(bucket, "crossref");
        assert_eq!(key, "processed_for_bq/2024/0.jsonl.gz");

        assert!(split_object_uri("gs://bucket-only").is_err());
        assert!(split_object_uri("gs:///key").is_err());
        assert!(split_object_uri("gs://b/../escape").is_err());
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("processed", "a/b.jsonl.gz"), "processed/a/b.jsonl.gz");
        assert_eq!(join_key("processed/", "/a.jsonl.gz"), "processed/a.jsonl.gz");
        assert_eq!(join_key("processed", "a\\b.jsonl.gz"), "processed/a/b.jsonl.gz");
        assert_eq!(join_key("", "a.jsonl.gz"), "a.jsonl.gz");
    }

    #[test]
    fn test_folder_prefix() {
        assert_eq!(folder_prefix("processed_for_bq"), "processed_for_bq/");
        assert_eq!(folder_prefix("processed_for_bq/"), "processed_for_bq/");
        assert_eq!(folder_prefix(""), "");
    }

    #[test]
    fn test_validate_resource_name() {
        assert!(validate_resource_name("my-resource").is_ok());
        assert!(validate_resource_name("my_resource").is_ok());
        assert!(validate_resource_name("my.resource").is_ok());
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("invalid name with spaces").is_err());
    }

    #[test]
    fn test_validate_key_path() {
        assert!(validate_key_path("path/to/key").is_ok());
        assert!(validate_key_path("key").is_ok());
        assert!(validate_key_path("").is_err());
        assert!(validate_key_path("/absolute/path").is_err());
        assert!(validate_key_path("a/../b").is_err());
    }
}
