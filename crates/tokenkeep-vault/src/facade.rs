use std::{
    collections::BTreeSet,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, TimeDelta, Utc};
use tokenkeep_core::{
    backend::KvBackend,
    codec::{self, Decoded},
    error::StoreError,
    records::{PersistedParams, Record, RecordKind, TokenRecord, INDEX_KEY},
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::settings::VaultSettings;

/// State that only exists inside the storage lock.
#[derive(Debug, Default)]
struct FacadeState {
    handles: BTreeSet<String>,
    /// False until `handles` has been loaded from the bound backend's index.
    index_synced: bool,
}

/// Serializes every backend access behind one lock and keeps the handle index
/// consistent with the per-handle records.
///
/// The lock is not reentrant. Public methods acquire it exactly once and the
/// `*_locked` helpers take the guarded state as a parameter, so the sweep can
/// reuse the removal path without locking twice.
pub struct StorageFacade {
    state: Mutex<FacadeState>,
    // Swapped only while `state` is held, except by `close` when the lock
    // could not be acquired in time.
    backend: RwLock<Option<Arc<dyn KvBackend>>>,
    settings: VaultSettings,
}

impl StorageFacade {
    pub fn new(backend: Option<Arc<dyn KvBackend>>, settings: VaultSettings) -> Self {
        Self {
            state: Mutex::new(FacadeState::default()),
            backend: RwLock::new(backend),
            settings,
        }
    }

    /// Whether a backend is currently bound.
    pub fn is_bound(&self) -> bool {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Swap the backend. The in-memory index is reloaded from the new backend
    /// on the next operation that needs it.
    #[instrument(skip_all, fields(bound = backend.is_some()))]
    pub async fn rebind(&self, backend: Option<Arc<dyn KvBackend>>) {
        let mut state = self.state.lock().await;
        self.set_backend(backend);
        state.index_synced = false;
        debug!("storage backend rebound");
    }

    pub async fn get_token(&self, handle: &str) -> Result<Option<TokenRecord>, StoreError> {
        self.get_record(handle).await
    }

    pub async fn get_params(&self, handle: &str) -> Result<Option<PersistedParams>, StoreError> {
        self.get_record(handle).await
    }

    /// Last write time for `handle`. An unreadable timestamp counts as "now".
    #[instrument(skip(self))]
    pub async fn get_last_used(&self, handle: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().await;
        let backend = self.bound(&state)?;
        read_last_used(backend.as_ref(), handle).await
    }

    /// Write (or with `None`, clear) the token record for `handle`.
    pub async fn put_token(
        &self,
        handle: &str,
        record: Option<&TokenRecord>,
    ) -> Result<(), StoreError> {
        self.put_record(handle, record).await
    }

    /// Write (or with `None`, clear) the configuration record for `handle`.
    pub async fn put_params(
        &self,
        handle: &str,
        record: Option<&PersistedParams>,
    ) -> Result<(), StoreError> {
        self.put_record(handle, record).await
    }

    /// Delete every record of `handle` and drop it from the index.
    /// Handles that are not indexed are left alone.
    #[instrument(skip(self))]
    pub async fn remove_by_handle(&self, handle: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let backend = self.bound(&state)?;
        self.sync_index(&mut state, backend.as_ref()).await?;
        remove_locked(&mut state, backend.as_ref(), handle).await
    }

    /// Remove every indexed handle, one locked step per handle.
    #[instrument(skip(self))]
    pub async fn remove_all(&self) -> Result<(), StoreError> {
        let handles = self.handles().await?;
        debug!(count = handles.len(), "removing all handles");
        for handle in &handles {
            self.remove_by_handle(handle).await?;
        }
        Ok(())
    }

    /// Handles listed in the persisted index. A missing or corrupt index is empty.
    pub async fn handles(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut state = self.state.lock().await;
        let backend = self.bound(&state)?;
        state.index_synced = false;
        self.sync_index(&mut state, backend.as_ref()).await?;
        Ok(state.handles.clone())
    }

    /// Sweep expired handles and release the backend.
    ///
    /// Waits at most `shutdown_lock_timeout` for the lock. On timeout the sweep
    /// is skipped. The backend is unbound in every case, so later calls fail
    /// with [`StoreError::StorageUnavailable`]. Never returns an error.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        match tokio::time::timeout(self.settings.shutdown_lock_timeout, self.state.lock()).await {
            Ok(mut state) => {
                if let Err(err) = self.sweep_locked(&mut state, Utc::now()).await {
                    warn!(error = %err, "expiry sweep aborted");
                }
                self.set_backend(None);
                state.index_synced = false;
            }
            Err(_) => {
                warn!(
                    timeout = ?self.settings.shutdown_lock_timeout,
                    "storage lock busy, skipping expiry sweep"
                );
                self.set_backend(None);
            }
        }
    }

    #[instrument(skip(self), fields(kind = ?R::KIND))]
    async fn get_record<R: Record>(&self, handle: &str) -> Result<Option<R>, StoreError> {
        let state = self.state.lock().await;
        let backend = self.bound(&state)?;
        let blob = backend.get(&R::KIND.key(handle)).await?;

        Ok(match codec::decode::<R>(blob.as_deref()) {
            Decoded::Present(record) => Some(record),
            Decoded::Absent => None,
            Decoded::Malformed(reason) => {
                error!(handle, kind = ?R::KIND, %reason, "unable to deserialize record, discarding");
                None
            }
        })
    }

    #[instrument(skip(self, record), fields(kind = ?R::KIND, tombstone = record.is_none()))]
    async fn put_record<R: Record>(
        &self,
        handle: &str,
        record: Option<&R>,
    ) -> Result<(), StoreError> {
        let blob = record.map(codec::encode).transpose()?;

        let mut state = self.state.lock().await;
        let backend = self.bound(&state)?;
        self.sync_index(&mut state, backend.as_ref()).await?;

        backend.put(&R::KIND.key(handle), blob.as_deref()).await?;
        backend
            .put(
                &RecordKind::LastUsed.key(handle),
                Some(&codec::encode_timestamp(Utc::now())),
            )
            .await?;

        if !state.handles.contains(handle) {
            let mut next = state.handles.clone();
            next.insert(handle.to_string());
            write_index(backend.as_ref(), &next).await?;
            debug!(handle, "handle added to index");
            state.handles = next;
        }
        Ok(())
    }

    async fn sweep_locked(
        &self,
        state: &mut FacadeState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let Some(backend) = self.current_backend() else {
            debug!("no backend bound, nothing to sweep");
            return Ok(());
        };

        state.index_synced = false;
        self.sync_index(state, backend.as_ref()).await?;
        let candidates = state.handles.clone();

        let mut removed = 0usize;
        for handle in &candidates {
            let last_used = match read_last_used(backend.as_ref(), handle).await {
                Ok(last_used) => last_used,
                Err(err) => {
                    warn!(handle, error = %err, "unable to read last use, keeping handle");
                    continue;
                }
            };
            if !is_expired(last_used, now, self.settings.retention_days) {
                continue;
            }
            match remove_locked(state, backend.as_ref(), handle).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(handle, error = %err, "unable to remove expired handle"),
            }
        }

        info!(
            removed,
            retained = candidates.len() - removed,
            "expiry sweep finished"
        );
        Ok(())
    }

    /// Load the persisted index into `state` unless already done for this backend.
    async fn sync_index(
        &self,
        state: &mut FacadeState,
        backend: &dyn KvBackend,
    ) -> Result<(), StoreError> {
        if state.index_synced {
            return Ok(());
        }

        let blob = backend.get(INDEX_KEY).await?;
        state.handles = match codec::decode_index(blob.as_deref()) {
            Decoded::Present(handles) => handles,
            Decoded::Absent => BTreeSet::new(),
            Decoded::Malformed(reason) => {
                error!(%reason, "handle index is corrupt, treating as empty");
                BTreeSet::new()
            }
        };
        state.index_synced = true;
        debug!(count = state.handles.len(), "handle index loaded");
        Ok(())
    }

    // `_state` proves the storage lock is held.
    fn bound(&self, _state: &FacadeState) -> Result<Arc<dyn KvBackend>, StoreError> {
        self.current_backend().ok_or(StoreError::StorageUnavailable)
    }

    fn current_backend(&self) -> Option<Arc<dyn KvBackend>> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_backend(&self, backend: Option<Arc<dyn KvBackend>>) {
        *self.backend.write().unwrap_or_else(PoisonError::into_inner) = backend;
    }
}

async fn remove_locked(
    state: &mut FacadeState,
    backend: &dyn KvBackend,
    handle: &str,
) -> Result<(), StoreError> {
    if !state.handles.contains(handle) {
        debug!(handle, "handle not indexed, nothing to remove");
        return Ok(());
    }

    for kind in RecordKind::ALL {
        backend.remove(&kind.key(handle)).await?;
    }

    let mut next = state.handles.clone();
    next.remove(handle);
    write_index(backend, &next).await?;
    state.handles = next;
    debug!(handle, "handle removed from storage");
    Ok(())
}

async fn write_index(backend: &dyn KvBackend, handles: &BTreeSet<String>) -> Result<(), StoreError> {
    let blob = codec::encode_index(handles)?;
    backend.put(INDEX_KEY, Some(&blob)).await?;
    Ok(())
}

async fn read_last_used(
    backend: &dyn KvBackend,
    handle: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let blob = backend.get(&RecordKind::LastUsed.key(handle)).await?;
    Ok(match codec::decode_timestamp(blob.as_deref()) {
        Decoded::Present(at) => Some(at),
        Decoded::Absent => None,
        Decoded::Malformed(reason) => {
            info!(handle, %reason, "unable to parse last use, resetting to now");
            Some(Utc::now())
        }
    })
}

/// A handle expires once `retention_days` have fully elapsed since its last
/// use. A handle without a last-use timestamp never expires, and neither does
/// one whose expiry instant is out of range.
pub fn is_expired(
    last_used: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    retention_days: i64,
) -> bool {
    let Some(at) = last_used else {
        return false;
    };
    TimeDelta::try_days(retention_days)
        .and_then(|retention| at.checked_add_signed(retention))
        .is_some_and(|expires_at| expires_at <= now)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tokenkeep_core::backend::InMemoryBackend;

    use super::*;

    fn facade_with(backend: &InMemoryBackend) -> StorageFacade {
        StorageFacade::new(Some(Arc::new(backend.clone())), VaultSettings::default())
    }

    async fn set_last_used(backend: &InMemoryBackend, handle: &str, at: DateTime<Utc>) {
        backend
            .put(
                &RecordKind::LastUsed.key(handle),
                Some(&codec::encode_timestamp(at)),
            )
            .await
            .expect("put last used");
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(is_expired(Some(now - Duration::days(183)), now, 183));
        assert!(!is_expired(
            Some(now - Duration::days(183) + Duration::seconds(1)),
            now,
            183
        ));
        assert!(!is_expired(None, now, 183));
    }

    #[test]
    fn out_of_range_expiry_is_kept() {
        let now = Utc::now();
        assert!(!is_expired(Some(DateTime::<Utc>::MAX_UTC), now, 183));
        assert!(!is_expired(Some(now), now, i64::MAX));
        assert!(!is_expired(Some(now - Duration::days(1)), now, 200_000_000));
    }

    #[tokio::test]
    async fn put_indexes_handle_and_stamps_last_use() {
        let backend = InMemoryBackend::new();
        let facade = facade_with(&backend);

        facade
            .put_params("h1", Some(&PersistedParams::default()))
            .await
            .expect("put");

        assert_eq!(
            backend.get(INDEX_KEY).await.expect("index").as_deref(),
            Some(r#"["h1"]"#)
        );
        assert!(facade.get_last_used("h1").await.expect("last used").is_some());
        assert!(facade.get_params("h1").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn malformed_record_reads_as_absent() {
        let backend = InMemoryBackend::new();
        let facade = facade_with(&backend);
        facade
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");
        facade
            .put_params("h2", Some(&PersistedParams::default()))
            .await
            .expect("put");

        backend
            .put(&RecordKind::AccessTokenResponse.key("h1"), Some("{ broken"))
            .await
            .expect("corrupt");

        assert_eq!(facade.get_token("h1").await.expect("get"), None);
        assert!(facade.get_params("h2").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn malformed_last_use_counts_as_now() {
        let backend = InMemoryBackend::new();
        let facade = facade_with(&backend);
        backend
            .put(&RecordKind::LastUsed.key("h1"), Some("yesterday"))
            .await
            .expect("put");

        let last_used = facade
            .get_last_used("h1")
            .await
            .expect("get")
            .expect("reset to now");
        assert!(Utc::now() - last_used < Duration::minutes(1));
    }

    #[tokio::test]
    async fn remove_by_handle_deletes_every_key_and_is_idempotent() {
        let backend = InMemoryBackend::new();
        let facade = facade_with(&backend);
        facade
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");
        facade
            .put_params("h1", Some(&PersistedParams::default()))
            .await
            .expect("put");

        facade.remove_by_handle("h1").await.expect("remove");
        facade.remove_by_handle("h1").await.expect("remove again");

        for kind in RecordKind::ALL {
            assert_eq!(backend.get(&kind.key("h1")).await.expect("get"), None);
        }
        assert!(facade.handles().await.expect("handles").is_empty());
        // only the (empty) index remains
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn unbound_facade_fails_fast() {
        let facade = StorageFacade::new(None, VaultSettings::default());

        assert_eq!(
            facade.get_token("h1").await,
            Err(StoreError::StorageUnavailable)
        );
        assert_eq!(
            facade.put_token("h1", None).await,
            Err(StoreError::StorageUnavailable)
        );
        assert_eq!(
            facade.remove_by_handle("h1").await,
            Err(StoreError::StorageUnavailable)
        );
        assert_eq!(facade.remove_all().await, Err(StoreError::StorageUnavailable));
    }

    #[tokio::test]
    async fn rebinding_reloads_index_from_new_backend() {
        let first = InMemoryBackend::new();
        let second = InMemoryBackend::new();
        let facade = facade_with(&first);
        facade
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");

        facade.rebind(Some(Arc::new(second.clone()))).await;
        facade
            .put_token("h2", Some(&TokenRecord::new("AT2", "RT2")))
            .await
            .expect("put");
        assert_eq!(
            facade.handles().await.expect("handles"),
            BTreeSet::from(["h2".to_string()])
        );

        facade.rebind(Some(Arc::new(first.clone()))).await;
        assert_eq!(
            facade.handles().await.expect("handles"),
            BTreeSet::from(["h1".to_string()])
        );
        facade.remove_by_handle("h1").await.expect("remove");
        assert_eq!(first.get("h1.AccessTokenResponse").await.expect("get"), None);
    }

    #[tokio::test]
    async fn index_written_by_earlier_facade_is_honoured() {
        let backend = InMemoryBackend::new();
        facade_with(&backend)
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");

        // a fresh facade has an empty in-memory index until it syncs
        let restarted = facade_with(&backend);
        restarted.remove_by_handle("h1").await.expect("remove");
        assert_eq!(
            backend.get(&RecordKind::AccessTokenResponse.key("h1")).await.expect("get"),
            None
        );
    }

    #[tokio::test]
    async fn corrupt_index_yields_nothing_to_remove() {
        let backend = InMemoryBackend::new();
        backend.put(INDEX_KEY, Some("h1 h2")).await.expect("put");
        let facade = facade_with(&backend);

        assert!(facade.handles().await.expect("handles").is_empty());
        facade.remove_all().await.expect("remove all");
    }

    #[tokio::test]
    async fn close_sweeps_expired_handles_and_unbinds() {
        let backend = InMemoryBackend::new();
        let facade = facade_with(&backend);
        for handle in ["h1", "h2", "h3"] {
            facade
                .put_token(handle, Some(&TokenRecord::new("AT", "RT")))
                .await
                .expect("put");
        }
        set_last_used(&backend, "h1", Utc::now() - Duration::days(200)).await;
        set_last_used(&backend, "h2", Utc::now() - Duration::days(10)).await;
        backend
            .remove(&RecordKind::LastUsed.key("h3"))
            .await
            .expect("drop last use");

        facade.close().await;
        assert!(!facade.is_bound());
        assert_eq!(
            facade.get_token("h2").await,
            Err(StoreError::StorageUnavailable)
        );

        let reopened = facade_with(&backend);
        assert_eq!(
            reopened.handles().await.expect("handles"),
            BTreeSet::from(["h2".to_string(), "h3".to_string()])
        );
        assert_eq!(reopened.get_token("h1").await.expect("get"), None);
        assert!(reopened.get_token("h2").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn close_survives_far_future_last_use() {
        let backend = InMemoryBackend::new();
        let facade = facade_with(&backend);
        facade
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");
        backend
            .put(
                &RecordKind::LastUsed.key("h1"),
                Some("\"+262142-12-01T00:00:00Z\""),
            )
            .await
            .expect("put last used");
        assert!(facade.get_last_used("h1").await.expect("get").is_some());

        facade.close().await;

        assert!(!facade.is_bound());
        assert!(backend
            .get(&RecordKind::AccessTokenResponse.key("h1"))
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn close_survives_huge_retention() {
        let backend = InMemoryBackend::new();
        let facade = StorageFacade::new(
            Some(Arc::new(backend.clone())),
            VaultSettings {
                retention_days: 200_000_000,
                ..VaultSettings::default()
            },
        );
        facade
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");

        facade.close().await;

        assert!(!facade.is_bound());
        assert_eq!(
            facade_with(&backend).handles().await.expect("handles"),
            BTreeSet::from(["h1".to_string()])
        );
    }

    #[tokio::test]
    async fn close_skips_sweep_when_lock_is_busy() {
        let backend = InMemoryBackend::new();
        let facade = StorageFacade::new(
            Some(Arc::new(backend.clone())),
            VaultSettings {
                shutdown_lock_timeout: std::time::Duration::from_millis(20),
                ..VaultSettings::default()
            },
        );
        facade
            .put_token("h1", Some(&TokenRecord::new("AT1", "RT1")))
            .await
            .expect("put");
        set_last_used(&backend, "h1", Utc::now() - Duration::days(400)).await;

        let held = facade.state.lock().await;
        facade.close().await;
        drop(held);

        assert!(!facade.is_bound());
        assert!(backend
            .get(&RecordKind::AccessTokenResponse.key("h1"))
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn close_without_backend_is_quiet() {
        let facade = StorageFacade::new(None, VaultSettings::default());
        facade.close().await;
        assert!(!facade.is_bound());
    }
}
