//! Persistence bridge
//!
//! Best-effort persist/rehydrate of [`WorkflowState`] plus the single
//! fingerprint-keyed strategy cache.

use crate::snapshot::{PersistedWorkflow, StrategyCache};
use crate::storage::{StorageBackend, StorageKey};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use wayfinder_core::{Fingerprint, StorageError, Strategy, WorkflowState};

/// Sink the engine hands every mutated state to
///
/// Implementations must not fail and should not block on I/O longer than
/// they have to.
pub trait Persister: Send + Sync + fmt::Debug {
    /// Persist `state`, swallowing (and logging) any failure
    fn persist(&self, state: &WorkflowState);
}

/// Bridge between [`WorkflowState`] and a [`StorageBackend`]
#[derive(Debug)]
pub struct PersistenceBridge {
    backend: Arc<dyn StorageBackend>,
    key: StorageKey,
    strategy_cache: Mutex<Option<StrategyCache>>,
}

impl PersistenceBridge {
    /// Bridge writing to `key` in `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, key: StorageKey) -> Self {
        Self {
            backend,
            key,
            strategy_cache: Mutex::new(None),
        }
    }

    /// Key this bridge writes to
    #[inline]
    #[must_use]
    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    /// Serialize and write `state`
    ///
    /// # Errors
    /// Storage or serialization failure
    pub fn try_persist(&self, state: &WorkflowState) -> Result<(), StorageError> {
        let cache = self.strategy_cache.lock().clone();
        let json = PersistedWorkflow::capture(state, cache).to_json()?;
        self.backend.write(&self.key, &json)
    }

    /// Read the raw blob
    ///
    /// # Errors
    /// Storage failure, corrupted JSON or unsupported version
    pub fn load_snapshot(&self) -> Result<Option<PersistedWorkflow>, StorageError> {
        self.backend
            .read(&self.key)?
            .map(|raw| PersistedWorkflow::from_json(&raw))
            .transpose()
    }

    /// Restore persisted state, `None` when there is nothing usable
    ///
    /// Any failure (unreadable storage, corrupted JSON, foreign version) is
    /// logged and treated as "no persisted state".
    #[must_use]
    pub fn rehydrate(&self) -> Option<WorkflowState> {
        match self.load_snapshot() {
            Ok(Some(mut blob)) => {
                let cache = blob.strategy_cache.take();
                *self.strategy_cache.lock() = cache;
                tracing::debug!(key = %self.key, "rehydrated workflow state");
                Some(blob.into_state())
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %self.key, "discarding persisted workflow state: {e}");
                None
            }
        }
    }

    /// Strategies generated from `fingerprint`
    ///
    /// An entry generated from a different analysis is stale: it is dropped
    /// and `None` is returned so the caller regenerates.
    #[must_use]
    pub fn cached_strategies(&self, fingerprint: &Fingerprint) -> Option<Vec<Strategy>> {
        let mut cache = self.strategy_cache.lock();
        match cache.as_ref() {
            Some(entry) if entry.fingerprint == *fingerprint => Some(entry.strategies.clone()),
            Some(entry) => {
                tracing::debug!(
                    cached = %entry.fingerprint.short(),
                    current = %fingerprint.short(),
                    "dropping stale strategy cache"
                );
                *cache = None;
                None
            }
            None => None,
        }
    }

    /// Remember strategies generated from `fingerprint`
    pub fn cache_strategies(&self, fingerprint: Fingerprint, strategies: Vec<Strategy>) {
        *self.strategy_cache.lock() = Some(StrategyCache {
            fingerprint,
            strategies,
        });
    }

    /// Drop the strategy cache
    pub fn invalidate_cache(&self) {
        *self.strategy_cache.lock() = None;
    }

    /// Remove the persisted blob
    pub fn clear(&self) {
        self.invalidate_cache();
        if let Err(e) = self.backend.remove(&self.key) {
            tracing::warn!(key = %self.key, "failed to clear persisted workflow state: {e}");
        }
    }
}

impl Persister for PersistenceBridge {
    fn persist(&self, state: &WorkflowState) {
        if let Err(e) = self.try_persist(state) {
            tracing::warn!(key = %self.key, "failed to persist workflow state: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageScope};
    use pretty_assertions::assert_eq;
    use wayfinder_core::{AnalysisResult, HomePatch, StepId, StepResultStore};

    fn bridge_with(backend: Arc<dyn StorageBackend>) -> PersistenceBridge {
        PersistenceBridge::new(
            backend,
            StorageKey::workflow("wayfinder", &StorageScope::Session("s1".into())),
        )
    }

    fn analyzed_state() -> WorkflowState {
        let mut store = StepResultStore::default();
        store.set_step(
            HomePatch::new()
                .analysis_completed(true)
                .website_analysis(AnalysisResult::new("Acme", "Devs", "APIs")),
        );
        store.mark_completed(StepId::Home);
        store.into_state()
    }

    #[test]
    fn persist_then_rehydrate() {
        let bridge = bridge_with(Arc::new(MemoryStorage::new()));
        assert!(bridge.rehydrate().is_none());

        let state = analyzed_state();
        bridge.persist(&state);
        assert_eq!(bridge.rehydrate(), Some(state));
    }

    #[test]
    fn quota_failure_is_swallowed() {
        let bridge = bridge_with(Arc::new(MemoryStorage::with_quota(16)));
        bridge.persist(&analyzed_state());

        assert!(bridge.try_persist(&analyzed_state()).is_err());
        assert!(bridge.rehydrate().is_none());
    }

    #[test]
    fn corrupted_blob_rehydrates_as_none() {
        let storage = Arc::new(MemoryStorage::new());
        let bridge = bridge_with(storage.clone());
        storage.write(bridge.key(), "{\"version\": 1, \"steps\":").unwrap();

        assert!(bridge.rehydrate().is_none());
        assert!(matches!(
            bridge.load_snapshot(),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn strategy_cache_is_fingerprint_scoped() {
        let bridge = bridge_with(Arc::new(MemoryStorage::new()));
        let f1 = Fingerprint::of(&AnalysisResult::new("Acme", "Devs", "APIs"));
        let f2 = Fingerprint::of(&AnalysisResult::new("Other", "Devs", "APIs"));
        let strategies = vec![Strategy::new("s1"), Strategy::new("s2")];

        bridge.cache_strategies(f1, strategies.clone());
        assert_eq!(bridge.cached_strategies(&f1), Some(strategies));

        // A different analysis drops the entry for good
        assert!(bridge.cached_strategies(&f2).is_none());
        assert!(bridge.cached_strategies(&f1).is_none());
    }

    #[test]
    fn strategy_cache_survives_rehydrate() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let f1 = Fingerprint::of(&AnalysisResult::new("Acme", "Devs", "APIs"));

        let writer = bridge_with(storage.clone());
        writer.cache_strategies(f1, vec![Strategy::new("s1")]);
        writer.persist(&analyzed_state());

        let reader = bridge_with(storage);
        assert!(reader.rehydrate().is_some());
        assert_eq!(reader.cached_strategies(&f1), Some(vec![Strategy::new("s1")]));
    }

    #[test]
    fn clear_removes_blob() {
        let storage = Arc::new(MemoryStorage::new());
        let bridge = bridge_with(storage.clone());
        bridge.persist(&analyzed_state());
        assert_eq!(storage.len(), 1);

        bridge.clear();
        assert!(storage.is_empty());
        assert!(bridge.rehydrate().is_none());
    }
}
