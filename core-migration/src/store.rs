//! Batch state storage and the observer-side progress handle

use crate::batch::{BatchKind, BatchState, RunOutcome};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Process-wide progress records, keyed by batch kind.
///
/// Each setter touches only its own field so that an observer raising the
/// cancellation flag is never overwritten by the running writer.
#[async_trait]
pub trait BatchStateStore: Send + Sync {
    /// Return the record to idle, clearing counters and flags
    async fn reset(&self, kind: BatchKind) -> Result<()>;

    async fn set_status(&self, kind: BatchKind, running: bool) -> Result<()>;

    async fn set_total_count(&self, kind: BatchKind, total: u64) -> Result<()>;

    /// # Errors
    /// `ProgressRegression` if the position would move back during a run.
    async fn set_current(&self, kind: BatchKind, current: u64) -> Result<()>;

    async fn set_current_file(&self, kind: BatchKind, name: &str) -> Result<()>;

    async fn set_should_cancel(&self, kind: BatchKind, cancel: bool) -> Result<()>;

    async fn should_cancel(&self, kind: BatchKind) -> Result<bool>;

    /// Move a running record to its terminal status
    async fn record_outcome(&self, kind: BatchKind, outcome: RunOutcome) -> Result<()>;

    async fn snapshot(&self, kind: BatchKind) -> Result<BatchState>;

    async fn snapshots(&self) -> Result<Vec<BatchState>> {
        let mut states = Vec::with_capacity(BatchKind::ALL.len());
        for kind in BatchKind::ALL {
            states.push(self.snapshot(kind).await?);
        }
        Ok(states)
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Store for a single process
#[derive(Default)]
pub struct InMemoryBatchStateStore {
    states: RwLock<HashMap<BatchKind, BatchState>>,
}

impl InMemoryBatchStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<T>(
        &self,
        kind: BatchKind,
        f: impl FnOnce(&mut BatchState) -> T + Send,
    ) -> T {
        let mut states = self.states.write().await;
        let state = states.entry(kind).or_insert_with(|| BatchState::idle(kind));
        f(state)
    }
}

#[async_trait]
impl BatchStateStore for InMemoryBatchStateStore {
    async fn reset(&self, kind: BatchKind) -> Result<()> {
        self.update(kind, |state| state.reset()).await;
        Ok(())
    }

    async fn set_status(&self, kind: BatchKind, running: bool) -> Result<()> {
        self.update(kind, |state| state.set_running(running)).await
    }

    async fn set_total_count(&self, kind: BatchKind, total: u64) -> Result<()> {
        self.update(kind, |state| state.set_total(total)).await;
        Ok(())
    }

    async fn set_current(&self, kind: BatchKind, current: u64) -> Result<()> {
        self.update(kind, |state| state.set_current(current)).await
    }

    async fn set_current_file(&self, kind: BatchKind, name: &str) -> Result<()> {
        self.update(kind, |state| state.set_current_file(name)).await;
        Ok(())
    }

    async fn set_should_cancel(&self, kind: BatchKind, cancel: bool) -> Result<()> {
        self.update(kind, |state| state.set_cancel(cancel)).await;
        Ok(())
    }

    async fn should_cancel(&self, kind: BatchKind) -> Result<bool> {
        let states = self.states.read().await;
        Ok(states.get(&kind).is_some_and(|state| state.cancel_requested))
    }

    async fn record_outcome(&self, kind: BatchKind, outcome: RunOutcome) -> Result<()> {
        self.update(kind, |state| state.finish(outcome)).await
    }

    async fn snapshot(&self, kind: BatchKind) -> Result<BatchState> {
        let states = self.states.read().await;
        Ok(states
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| BatchState::idle(kind)))
    }
}

// ============================================================================
// Observer Handle
// ============================================================================

/// Read access to progress plus the right to request cancellation
#[derive(Clone)]
pub struct ProgressHandle {
    store: Arc<dyn BatchStateStore>,
}

impl ProgressHandle {
    pub fn new(store: Arc<dyn BatchStateStore>) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self, kind: BatchKind) -> Result<BatchState> {
        self.store.snapshot(kind).await
    }

    pub async fn snapshots(&self) -> Result<Vec<BatchState>> {
        self.store.snapshots().await
    }

    /// Ask a running batch to stop before its next item.
    ///
    /// Returns `false` (and changes nothing) when no run of `kind` is
    /// active.
    pub async fn request_cancel(&self, kind: BatchKind) -> Result<bool> {
        if !self.store.snapshot(kind).await?.running {
            return Ok(false);
        }
        self.store.set_should_cancel(kind, true).await?;
        info!(kind = %kind, "Cancellation requested");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchStatus;

    #[tokio::test]
    async fn test_unknown_kind_reads_as_idle() {
        let store = InMemoryBatchStateStore::new();
        let state = store.snapshot(BatchKind::Unlink).await.unwrap();

        assert_eq!(state.status, BatchStatus::Idle);
        assert!(!store.should_cancel(BatchKind::Unlink).await.unwrap());
        assert_eq!(store.snapshots().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_setters_are_independent() {
        let store = InMemoryBatchStateStore::new();
        let kind = BatchKind::Import;

        store.reset(kind).await.unwrap();
        store.set_status(kind, true).await.unwrap();
        store.set_total_count(kind, 10).await.unwrap();
        store.set_should_cancel(kind, true).await.unwrap();
        store.set_current(kind, 1).await.unwrap();
        store.set_current_file(kind, "a.jpg").await.unwrap();

        let state = store.snapshot(kind).await.unwrap();
        assert!(state.running);
        assert!(state.cancel_requested);
        assert_eq!((state.current, state.total), (1, 10));
        assert_eq!(state.current_file_name, "a.jpg");

        // Other kinds are untouched
        assert!(!store.snapshot(BatchKind::Unlink).await.unwrap().running);
    }

    #[tokio::test]
    async fn test_request_cancel_only_when_running() {
        let store: Arc<dyn BatchStateStore> = Arc::new(InMemoryBatchStateStore::new());
        let handle = ProgressHandle::new(store.clone());

        assert!(!handle.request_cancel(BatchKind::Import).await.unwrap());
        assert!(!store.should_cancel(BatchKind::Import).await.unwrap());

        store.set_status(BatchKind::Import, true).await.unwrap();
        assert!(handle.request_cancel(BatchKind::Import).await.unwrap());
        assert!(store.should_cancel(BatchKind::Import).await.unwrap());
    }
}
