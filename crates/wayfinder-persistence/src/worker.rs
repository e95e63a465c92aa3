//! Fire-and-forget persistence on a background task
//!
//! [`BackgroundPersister::persist`] only publishes the latest state into a
//! `watch` channel; a tokio task performs the write on the blocking pool.
//! Snapshots published faster than they are written coalesce, so the last
//! writer wins.

use crate::bridge::{PersistenceBridge, Persister};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wayfinder_core::WorkflowState;

type Pending = Option<(u64, WorkflowState)>;

/// Non-blocking [`Persister`] backed by a [`PersistenceBridge`]
#[derive(Debug)]
pub struct BackgroundPersister {
    pending: watch::Sender<Pending>,
    written: watch::Receiver<u64>,
    generation: AtomicU64,
    task: JoinHandle<()>,
}

impl BackgroundPersister {
    /// Spawn the writer task on the current tokio runtime
    ///
    /// # Panics
    /// When called outside a tokio runtime
    #[must_use]
    pub fn spawn(bridge: Arc<PersistenceBridge>) -> Self {
        let (pending, mut rx) = watch::channel::<Pending>(None);
        let (written_tx, written) = watch::channel(0u64);

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some((generation, state)) = rx.borrow_and_update().clone() else {
                    continue;
                };
                let bridge = bridge.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || bridge.persist(&state)).await
                {
                    tracing::warn!("background persistence task failed: {e}");
                }
                written_tx.send_replace(generation);
            }
            tracing::debug!("background persister stopped");
        });

        Self {
            pending,
            written,
            generation: AtomicU64::new(0),
            task,
        }
    }

    /// Wait until the most recently published state has been written
    pub async fn flush(&self) {
        let target = self.generation.load(Ordering::SeqCst);
        let mut written = self.written.clone();
        if written.wait_for(|w| *w >= target).await.is_err() {
            tracing::warn!("background persister stopped before flush completed");
        }
    }
}

impl Persister for BackgroundPersister {
    fn persist(&self, state: &WorkflowState) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.send_replace(Some((generation, state.clone())));
    }
}

impl Drop for BackgroundPersister {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageKey, StorageScope};
    use wayfinder_core::{AnalysisResult, HomePatch, StepResultStore};

    fn bridge() -> Arc<PersistenceBridge> {
        Arc::new(PersistenceBridge::new(
            Arc::new(MemoryStorage::new()),
            StorageKey::workflow("wayfinder", &StorageScope::Session("bg".into())),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_waits_for_latest_state() {
        let bridge = bridge();
        let persister = BackgroundPersister::spawn(bridge.clone());

        let mut store = StepResultStore::default();
        persister.persist(store.state());
        store.set_step(
            HomePatch::new()
                .analysis_completed(true)
                .website_analysis(AnalysisResult::new("Acme", "Devs", "APIs")),
        );
        persister.persist(store.state());

        persister.flush().await;
        assert_eq!(bridge.rehydrate().as_ref(), Some(store.state()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_without_writes_returns_immediately() {
        let persister = BackgroundPersister::spawn(bridge());
        persister.flush().await;
    }
}
