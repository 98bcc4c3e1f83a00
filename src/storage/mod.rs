//! Storage collaborators: where source objects are read from and where the
//! Markdown output is published.
//!
//! The pipeline talks to storage only through [`ObjectStore`]. Three backends
//! ship with the crate:
//!
//! | Backend | Connection | Notes |
//! |---------|------------|-------|
//! | [`LocalStore`] | directory path or `file://` URL | atomic temp-file + rename writes |
//! | [`HttpBlobStore`] | blob endpoint URL, optionally with a SAS token | `GET` / `PUT BlockBlob` |
//! | [`MemoryStore`] | none | tests and embedding |
//!
//! Retries belong to the backend or to whoever delivers events; the pipeline
//! issues each request once.

mod http;
mod local;
mod memory;

pub use http::HttpBlobStore;
pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::config::{StorageConnection, StorageLocation};
use crate::error::{ConfigError, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Read/write access to one storage location (a container or directory).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the complete content of the object at `key`.
    async fn read_all(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write `bytes` as the full content of `key`.
    ///
    /// With `overwrite = true` any existing object is replaced
    /// (last write wins). With `overwrite = false` an existing object yields
    /// [`StorageError::AlreadyExists`].
    async fn write(&self, key: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), StorageError>;

    /// Human-readable location used in log records and error messages.
    fn describe(&self) -> String;
}

/// Reject keys that cannot name an object.
///
/// Keys are `/`-separated relative paths. Empty keys, keys ending in `/`,
/// absolute keys and `.`/`..` segments are refused so that no backend can be
/// tricked into touching anything outside its location.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.trim().is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(invalid("key must be relative"));
    }
    if key.ends_with('/') {
        return Err(invalid("key names a directory, not an object"));
    }
    if key.contains('\0') {
        return Err(invalid("key contains a NUL byte"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("key contains an empty path segment")),
            "." | ".." => return Err(invalid("key contains a relative path segment")),
            _ => {}
        }
    }
    Ok(())
}

impl StorageLocation {
    /// Build the backend for this location.
    pub fn open(&self, timeout: Duration) -> Result<Arc<dyn ObjectStore>, ConfigError> {
        match &self.connection {
            StorageConnection::Local { root } => {
                Ok(Arc::new(LocalStore::new(root.join(&self.container))))
            }
            StorageConnection::Http { endpoint, sas } => Ok(Arc::new(HttpBlobStore::new(
                endpoint,
                &self.container,
                sas.clone(),
                timeout,
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_keys() {
        assert!(validate_key("Q1.pdf").is_ok());
        assert!(validate_key("reports/2024/Q1.pdf").is_ok());
        assert!(validate_key("with space/é.docx").is_ok());
    }

    #[test]
    fn rejects_keys_that_escape_or_name_directories() {
        for key in ["", "  ", "/etc/passwd", "a/../b", "./a", "dir/", "a//b", "\\x"] {
            let err = validate_key(key).unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidKey { .. }),
                "{key:?} should be rejected, got {err:?}"
            );
        }
    }
}
