use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokenkeep_core::cipher::{CipherError, StorageCipher};
use tracing::instrument;

use crate::key_provider::{KeyMaterial, KeyProvider};

/// Identifier the default configuration selects.
pub const CIPHER_ID: &str = "SymmetricKeyCipher";

const NONCE_LEN: usize = 12;

/// AES-256-GCM field cipher. Output is base64 of `nonce || ciphertext`, so every
/// encryption of the same plaintext yields a different blob.
pub struct SymmetricKeyCipher<P: KeyProvider> {
    key_provider: P,
}

impl<P: KeyProvider> SymmetricKeyCipher<P> {
    pub fn new(key_provider: P) -> Self {
        Self { key_provider }
    }

    async fn cipher(&self) -> Result<Aes256Gcm, CipherError> {
        let material = self
            .key_provider
            .get_or_create()
            .await
            .map_err(|e| CipherError::Key(e.to_string()))?;
        build_cipher(&material)
    }
}

#[async_trait]
impl<P: KeyProvider> StorageCipher for SymmetricKeyCipher<P> {
    fn id(&self) -> &str {
        CIPHER_ID
    }

    #[instrument(skip_all)]
    async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = self.cipher().await?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    #[instrument(skip_all)]
    async fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let blob = STANDARD
            .decode(ciphertext)
            .map_err(|e| CipherError::Decrypt(format!("base64 decode failed: {e}")))?;
        if blob.len() <= NONCE_LEN {
            return Err(CipherError::Decrypt(format!(
                "ciphertext too short: {} bytes",
                blob.len()
            )));
        }

        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let cipher = self.cipher().await?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CipherError::Decrypt(format!("plaintext is not utf-8: {e}")))
    }
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(&material.bytes)
        .map_err(|e| CipherError::Key(format!("cipher init failed: {e}")))
}
