use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, UrlStore};

/// Process-local store backed by a `HashMap` (thread-safe).
#[derive(Debug, Default)]
pub struct MemoryStore {
    urls: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded fingerprints.
    pub fn len(&self) -> usize {
        self.urls.read().map(|urls| urls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UrlStore for MemoryStore {
    fn put(&self, fingerprint: &str, url: &str) -> Result<(), StoreError> {
        let mut urls = self.urls.write().map_err(|_| StoreError::Poisoned)?;
        urls.insert(fingerprint.to_string(), url.to_string());
        Ok(())
    }

    fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        let urls = self.urls.read().map_err(|_| StoreError::Poisoned)?;
        Ok(urls.get(fingerprint).cloned())
    }

    fn remove(&self, fingerprint: &str) -> Result<(), StoreError> {
        let mut urls = self.urls.write().map_err(|_| StoreError::Poisoned)?;
        urls.remove(fingerprint);
        Ok(())
    }
}
