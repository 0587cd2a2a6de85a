use async_trait::async_trait;
use thiserror::Error;

/// Security errors raised by cipher implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("decrypt failed: {0}")]
    Decrypt(String),
    #[error("key unavailable: {0}")]
    Key(String),
}

/// Field-level cipher applied to secret token values before they hit a backend.
///
/// Implementations must be deterministic in identity: `id` is used to pick the
/// active cipher from a registry and must not change over the cipher's lifetime.
#[async_trait]
pub trait StorageCipher: Send + Sync {
    /// Stable identifier used for target selection.
    fn id(&self) -> &str;

    async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    async fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}
