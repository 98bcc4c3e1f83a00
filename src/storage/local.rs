//! Filesystem-backed object store.

use super::{validate_key, ObjectStore};
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Objects are files below `root`; `/` in a key maps to a subdirectory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn map_io(&self, key: &str, path: &Path, e: std::io::Error) -> StorageError {
        match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                key: key.to_string(),
                location: self.location(),
            },
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                key: key.to_string(),
                location: self.location(),
                detail: e.to_string(),
            },
            _ => StorageError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn read_all(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        if tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "key names a directory".to_string(),
            });
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| self.map_io(key, &path, e))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(bytes)
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| self.map_io(key, &parent, e))?;

        // Write to a temp file in the target directory, then rename over the
        // destination: readers only ever see the old or the new content.
        let target = path.clone();
        let len = bytes.len();
        let result = tokio::task::spawn_blocking(move || -> Result<(), (PathBuf, std::io::Error)> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| (parent.clone(), e))?;
            tmp.write_all(&bytes).map_err(|e| (tmp.path().to_path_buf(), e))?;
            tmp.as_file().sync_all().map_err(|e| (tmp.path().to_path_buf(), e))?;
            if overwrite {
                tmp.persist(&target).map_err(|e| (target.clone(), e.error))?;
            } else {
                tmp.persist_noclobber(&target)
                    .map_err(|e| (target.clone(), e.error))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io {
            path: path.clone(),
            source: std::io::Error::other(format!("write task panicked: {e}")),
        })?;

        match result {
            Ok(()) => {
                debug!("Wrote {} bytes to {}", len, path.display());
                Ok(())
            }
            Err((_, e)) if e.kind() == std::io::ErrorKind::AlreadyExists && !overwrite => {
                Err(StorageError::AlreadyExists {
                    key: key.to_string(),
                    location: self.location(),
                })
            }
            Err((p, e)) => Err(self.map_io(key, &p, e)),
        }
    }

    fn describe(&self) -> String {
        format!("local:{}", self.location())
    }
}
