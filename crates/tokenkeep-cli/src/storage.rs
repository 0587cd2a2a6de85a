use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use tokenkeep_core::cipher::StorageCipher;
use tokenkeep_storage::{
    file_backend::FileKvBackend,
    key_provider::{EnvKeyProvider, KeyringProvider},
    symmetric_cipher::SymmetricKeyCipher,
};
use tokenkeep_vault::TokenStore;
use tracing::debug;

/// Resolve the default data directory for Tokenkeep.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("tokenkeep"))
}

/// Build a store bound to the file backend, with the configured cipher active.
pub async fn open_store(config: &Config) -> Result<TokenStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "opening token store");

    let cipher: Arc<dyn StorageCipher> = match &config.key_env {
        Some(var) => Arc::new(SymmetricKeyCipher::new(EnvKeyProvider::new(var.clone()))),
        None => {
            let (service, account) = config.keyring_entry();
            Arc::new(SymmetricKeyCipher::new(KeyringProvider::new(service, account)))
        }
    };

    open_with(root, cipher, config).await
}

async fn open_with(
    root: PathBuf,
    cipher: Arc<dyn StorageCipher>,
    config: &Config,
) -> Result<TokenStore> {
    let store = TokenStore::new(config.vault_settings());
    store.register_cipher(cipher);
    store
        .activate(config.cipher_target())
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    store.bind(Arc::new(FileKvBackend::new(root))).await;
    Ok(store)
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub async fn test_store(root: impl Into<PathBuf>) -> TokenStore {
    use tokenkeep_storage::key_provider::InMemoryKeyProvider;

    let cipher = Arc::new(SymmetricKeyCipher::new(InMemoryKeyProvider::default()));
    open_with(root.into(), cipher, &Config::default())
        .await
        .expect("test store")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenkeep_storage::key_provider::InMemoryKeyProvider;

    #[tokio::test]
    async fn unknown_cipher_target_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            cipher_target: Some("RsaCipher".into()),
            ..Config::default()
        };
        let cipher = Arc::new(SymmetricKeyCipher::new(InMemoryKeyProvider::default()));

        let err = open_with(dir.path().to_path_buf(), cipher, &config)
            .await
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("RsaCipher"));
    }
}
