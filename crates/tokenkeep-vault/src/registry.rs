use std::sync::{Arc, PoisonError, RwLock};

use tokenkeep_core::{cipher::StorageCipher, error::StoreError};
use tracing::debug;

#[derive(Default)]
struct RegistryState {
    available: Vec<Arc<dyn StorageCipher>>,
    active: Option<Arc<dyn StorageCipher>>,
}

/// Registered ciphers plus the one selected for field encryption.
///
/// Guarded by its own lock, independent of the storage lock. Callers clone the
/// active cipher out before awaiting on it.
#[derive(Default)]
pub struct CipherRegistry {
    inner: RwLock<RegistryState>,
}

impl CipherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cipher. A cipher with the same id replaces the earlier one.
    pub fn register(&self, cipher: Arc<dyn StorageCipher>) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.available.retain(|known| known.id() != cipher.id());
        debug!(cipher = cipher.id(), "registered storage cipher");
        state.available.push(cipher);
    }

    /// Remove a cipher by id. Removing the active cipher leaves none active.
    /// Returns whether a cipher was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.available.len();
        state.available.retain(|known| known.id() != id);

        if state.active.as_ref().is_some_and(|active| active.id() == id) {
            debug!(cipher = id, "active storage cipher removed");
            state.active = None;
        }
        state.available.len() != before
    }

    /// Select the registered cipher whose id equals `target`. When none
    /// matches, no cipher is left active.
    pub fn activate(&self, target: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.active = state
            .available
            .iter()
            .find(|cipher| cipher.id() == target)
            .cloned();

        match &state.active {
            Some(chosen) => {
                debug!(cipher = chosen.id(), "using storage cipher");
                Ok(())
            }
            None => Err(StoreError::CipherNotConfigured {
                target: target.to_string(),
            }),
        }
    }

    pub fn active(&self) -> Option<Arc<dyn StorageCipher>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .available
            .iter()
            .map(|cipher| cipher.id().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokenkeep_core::cipher::CipherError;

    use super::*;

    struct NamedCipher(&'static str);

    #[async_trait]
    impl StorageCipher for NamedCipher {
        fn id(&self) -> &str {
            self.0
        }

        async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
            Ok(plaintext.to_string())
        }

        async fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
            Ok(ciphertext.to_string())
        }
    }

    #[test]
    fn activates_matching_target() {
        let registry = CipherRegistry::new();
        registry.register(Arc::new(NamedCipher("first")));
        registry.register(Arc::new(NamedCipher("second")));

        registry.activate("second").expect("activate");
        assert_eq!(registry.active().map(|c| c.id().to_string()), Some("second".into()));
    }

    #[test]
    fn unknown_target_is_not_configured() {
        let registry = CipherRegistry::new();
        registry.register(Arc::new(NamedCipher("first")));

        let err = registry.activate("missing").expect_err("no such cipher");
        assert_eq!(
            err,
            StoreError::CipherNotConfigured {
                target: "missing".into()
            }
        );
        assert!(registry.active().is_none());
    }

    #[test]
    fn failed_activation_drops_previous_selection() {
        let registry = CipherRegistry::new();
        registry.register(Arc::new(NamedCipher("first")));
        registry.activate("first").expect("activate");

        registry.activate("missing").expect_err("no such cipher");
        assert!(registry.active().is_none());
    }

    #[test]
    fn unregistering_active_cipher_clears_selection() {
        let registry = CipherRegistry::new();
        registry.register(Arc::new(NamedCipher("first")));
        registry.register(Arc::new(NamedCipher("second")));
        registry.activate("first").expect("activate");

        assert!(!registry.unregister("unknown"));
        assert!(registry.active().is_some());

        assert!(registry.unregister("first"));
        assert!(registry.active().is_none());
        assert_eq!(registry.registered_ids(), vec!["second".to_string()]);
    }

    #[test]
    fn re_registering_replaces_same_id() {
        let registry = CipherRegistry::new();
        registry.register(Arc::new(NamedCipher("first")));
        registry.register(Arc::new(NamedCipher("first")));
        assert_eq!(registry.registered_ids(), vec!["first".to_string()]);
    }
}
