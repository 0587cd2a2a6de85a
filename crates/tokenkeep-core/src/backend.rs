use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by key-value backends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Underlying storage failure.
    #[error("backend failure: {reason}")]
    Storage { reason: String },
}

/// Plain text key-value persistence the facade writes through.
///
/// Backends give no multi-key guarantees; callers serialize access themselves.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch the text stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key`. `None` deletes the key.
    async fn put(&self, key: &str, value: Option<&str>) -> Result<(), BackendError>;

    /// Remove a key (idempotent).
    async fn remove(&self, key: &str) -> Result<(), BackendError>;
}

/// In-memory backend for tests and ephemeral sessions.
/// Cloning shares the underlying map, so a clone can be rebound later and still
/// see everything written through the first instance.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Option<&str>) -> Result<(), BackendError> {
        let mut map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        match value {
            Some(text) => {
                map.insert(key.to_string(), text.to_string());
            }
            None => {
                map.remove(key);
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(key);
        Ok(())
    }
}
