//! Core abstractions for Tokenkeep: the backend and cipher ports, the
//! persisted record model, and the codec between records and text blobs.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod backend;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod records;

pub use backend::{BackendError, InMemoryBackend, KvBackend};
pub use cipher::{CipherError, StorageCipher};
pub use error::StoreError;
pub use records::{PersistedParams, RecordKind, TokenRecord, INDEX_KEY};
