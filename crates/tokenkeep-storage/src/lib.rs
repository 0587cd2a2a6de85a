//! Concrete adapters for the Tokenkeep ports: an AES-GCM field cipher with keys
//! sourced from the OS keyring (or test doubles), and a file-backed key-value
//! backend.

pub mod file_backend;
pub mod key_provider;
pub mod symmetric_cipher;
