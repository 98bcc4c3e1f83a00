//! In-process object store.

use super::{validate_key, ObjectStore};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A map of key → bytes. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arc::default(),
        }
    }

    /// Seed an object directly, bypassing key validation.
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), bytes.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map still holds consistent data: every mutation is a
        // single insert.
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn read_all(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
            location: self.describe(),
        })
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut objects = self.lock();
        if !overwrite && objects.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
                location: self.describe(),
            });
        }
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}
