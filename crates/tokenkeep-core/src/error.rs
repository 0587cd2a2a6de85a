use thiserror::Error;

use crate::{backend::BackendError, cipher::CipherError};

/// Errors surfaced by the token store and its storage facade.
///
/// Malformed persisted records are not represented here: reads treat them as
/// absent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No backend is currently bound.
    #[error("unable to continue, storage is not available")]
    StorageUnavailable,
    /// No registered cipher matches the configured target.
    #[error("no storage cipher registered with target={target}")]
    CipherNotConfigured { target: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A stored secret field could not be decrypted.
    #[error("token decryption failed: {0}")]
    Decryption(CipherError),
    #[error("record serialization failed: {0}")]
    Serialization(String),
}
