use std::{collections::BTreeSet, sync::Arc};

use tokenkeep_core::{
    backend::KvBackend,
    cipher::{CipherError, StorageCipher},
    error::StoreError,
    records::{PersistedParams, TokenRecord},
};
use tracing::{debug, instrument, warn};

use crate::{facade::StorageFacade, registry::CipherRegistry, settings::VaultSettings};

/// Public surface for persisting token and configuration records per handle.
///
/// Access and refresh tokens are encrypted field by field with the active
/// cipher; all other fields stay readable at rest.
pub struct TokenStore {
    facade: StorageFacade,
    ciphers: CipherRegistry,
}

impl TokenStore {
    /// A store with no backend bound and no cipher registered.
    pub fn new(settings: VaultSettings) -> Self {
        Self {
            facade: StorageFacade::new(None, settings),
            ciphers: CipherRegistry::new(),
        }
    }

    pub fn facade(&self) -> &StorageFacade {
        &self.facade
    }

    pub fn ciphers(&self) -> &CipherRegistry {
        &self.ciphers
    }

    pub fn register_cipher(&self, cipher: Arc<dyn StorageCipher>) {
        self.ciphers.register(cipher);
    }

    pub fn unregister_cipher(&self, id: &str) -> bool {
        self.ciphers.unregister(id)
    }

    /// Select the cipher used for secret fields. Fails with
    /// [`StoreError::CipherNotConfigured`] when no registered cipher matches.
    pub fn activate(&self, cipher_target: &str) -> Result<(), StoreError> {
        self.ciphers.activate(cipher_target)
    }

    pub async fn bind(&self, backend: Arc<dyn KvBackend>) {
        self.facade.rebind(Some(backend)).await;
    }

    pub async fn unbind(&self) {
        self.facade.rebind(None).await;
    }

    /// Run the expiry sweep and release the backend. Never fails.
    pub async fn shutdown(&self) {
        self.facade.close().await;
    }

    /// Persist a token for `handle`. `None` stores an empty record so the
    /// handle stays known. If encryption fails the record is stored as-is.
    #[instrument(skip(self, token))]
    pub async fn save_token(
        &self,
        handle: &str,
        token: Option<&TokenRecord>,
    ) -> Result<(), StoreError> {
        let token = token.cloned().unwrap_or_default();

        let stored = match self.encrypt_token(&token).await {
            Ok(encrypted) => encrypted,
            Err(err) => {
                warn!(handle, error = %err, "unable to encrypt token, storing as-is");
                token
            }
        };
        self.facade.put_token(handle, Some(&stored)).await
    }

    /// Load and decrypt the token for `handle`. Absent or unreadable records
    /// load as `None`.
    #[instrument(skip(self))]
    pub async fn load_token(&self, handle: &str) -> Result<Option<TokenRecord>, StoreError> {
        let Some(stored) = self.facade.get_token(handle).await? else {
            return Ok(None);
        };
        self.decrypt_token(stored)
            .await
            .map(Some)
            .map_err(StoreError::Decryption)
    }

    #[instrument(skip(self, params))]
    pub async fn save_params(
        &self,
        handle: &str,
        params: Option<&PersistedParams>,
    ) -> Result<(), StoreError> {
        self.facade.put_params(handle, params).await
    }

    pub async fn load_params(&self, handle: &str) -> Result<Option<PersistedParams>, StoreError> {
        self.facade.get_params(handle).await
    }

    pub async fn remove(&self, handle: &str) -> Result<(), StoreError> {
        self.facade.remove_by_handle(handle).await
    }

    pub async fn remove_all(&self) -> Result<(), StoreError> {
        self.facade.remove_all().await
    }

    pub async fn handles(&self) -> Result<BTreeSet<String>, StoreError> {
        self.facade.handles().await
    }

    async fn encrypt_token(&self, token: &TokenRecord) -> Result<TokenRecord, CipherError> {
        let mut encrypted = token.clone();
        let Some(cipher) = self.ciphers.active() else {
            return Ok(encrypted);
        };

        if let Some(access) = &token.access_token {
            encrypted.access_token = Some(cipher.encrypt(access).await?);
        }
        if let Some(refresh) = &token.refresh_token {
            encrypted.refresh_token = Some(cipher.encrypt(refresh).await?);
        }
        Ok(encrypted)
    }

    async fn decrypt_token(&self, mut token: TokenRecord) -> Result<TokenRecord, CipherError> {
        let Some(cipher) = self.ciphers.active() else {
            return Ok(token);
        };

        debug!(cipher = cipher.id(), "decrypting token");
        if let Some(access) = token.access_token.take() {
            token.access_token = Some(cipher.decrypt(&access).await?);
        }
        if let Some(refresh) = token.refresh_token.take() {
            token.refresh_token = Some(cipher.decrypt(&refresh).await?);
        }
        Ok(token)
    }
}
