use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tempfile::NamedTempFile;
use tokenkeep_core::backend::{BackendError, KvBackend};
use tracing::instrument;

/// File-backed key-value store: one file per key under `root`.
/// Writes go through a temp file in the same directory and are renamed into
/// place, so a reader never sees a half-written value.
#[derive(Debug, Clone)]
pub struct FileKvBackend {
    root: PathBuf,
}

impl FileKvBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }
}

#[async_trait]
impl KvBackend for FileKvBackend {
    #[instrument(skip_all, fields(key))]
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_err(err)),
        }
    }

    #[instrument(skip_all, fields(key))]
    async fn put(&self, key: &str, value: Option<&str>) -> Result<(), BackendError> {
        match value {
            Some(text) => write_atomic(&self.path_for(key), text),
            None => self.remove(key).await,
        }
    }

    #[instrument(skip_all, fields(key))]
    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

fn write_atomic(path: &Path, text: &str) -> Result<(), BackendError> {
    let parent = path.parent().ok_or_else(|| BackendError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(text.as_bytes()).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

// Handles are opaque, so keys may contain path separators.
fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn storage_err<E: ToString>(err: E) -> BackendError {
    BackendError::Storage {
        reason: err.to_string(),
    }
}
