//! Encrypted, lock-serialized persistence of token and configuration records
//! keyed by opaque handles.
//!
//! [`TokenStore`] is the public surface. It encrypts secret token fields with
//! the active cipher from its [`CipherRegistry`] and writes through a
//! [`StorageFacade`], which owns the backend reference and the handle index
//! behind a single lock.

pub mod facade;
pub mod registry;
pub mod settings;
pub mod token_store;

pub use facade::StorageFacade;
pub use registry::CipherRegistry;
pub use settings::VaultSettings;
pub use token_store::TokenStore;
