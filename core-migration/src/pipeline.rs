//! # Migration Pipeline
//!
//! Walks a list of catalog items with one worker, applying an
//! [`ItemProcessor`] to each and publishing progress to the batch store.
//!
//! ## Workflow
//!
//! 1. Reset the record for the processor's kind, mark it running and set the
//!    total
//! 2. For each item: stop if cancellation was requested, publish position
//!    and file name, then process it
//! 3. Missing files are skipped and per-item failures are logged; neither
//!    stops the run
//! 4. Record the outcome and reset the record, whether the run completed or
//!    was cancelled
//!
//! Only a failure of the batch store itself ends a run early with an error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pipeline = MigrationPipeline::new(catalog.clone(), batch_store.clone());
//! let report = pipeline
//!     .run_query(QueryBounds::all().with_limit(500), ItemFilter::ImagesOnly, &processor)
//!     .await?;
//! println!("{} processed, {} skipped", report.processed, report.skipped);
//! ```

use crate::batch::{BatchKind, RunOutcome};
use crate::store::BatchStateStore;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_library::{CatalogItem, CatalogRepository, ItemFilter, ItemId, QueryBounds};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Per-item work of one batch kind
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    fn kind(&self) -> BatchKind;

    /// Process one item.
    ///
    /// Return `MigrationError::ItemFileMissing` to have the item counted as
    /// skipped; any other error counts as a failure.
    async fn process(&self, item: &CatalogItem) -> Result<()>;
}

/// What happened to one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Processed,
    Skipped,
    Failed,
}

/// Progress line emitted after each item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProgress {
    pub kind: BatchKind,
    pub position: u64,
    pub total: u64,
    pub item_id: ItemId,
    pub file: String,
    pub status: ItemStatus,
}

pub type ProgressCallback = Arc<dyn Fn(&ItemProgress) + Send + Sync>;

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: BatchKind,
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Items the run reached, whatever their result
    pub fn visited(&self) -> u64 {
        self.processed + self.skipped + self.failed
    }
}

pub struct MigrationPipeline {
    catalog: Arc<dyn CatalogRepository>,
    store: Arc<dyn BatchStateStore>,
    progress: Option<ProgressCallback>,
}

impl MigrationPipeline {
    pub fn new(catalog: Arc<dyn CatalogRepository>, store: Arc<dyn BatchStateStore>) -> Self {
        Self {
            catalog,
            store,
            progress: None,
        }
    }

    /// Call `callback` after every item
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run over the ids matched by a catalog query
    pub async fn run_query(
        &self,
        bounds: QueryBounds,
        filter: ItemFilter,
        processor: &dyn ItemProcessor,
    ) -> Result<RunReport> {
        let page = self.catalog.query_ids(bounds, filter).await?;
        debug!(
            kind = %processor.kind(),
            selected = page.len(),
            matching = page.total,
            "Catalog query resolved"
        );
        self.run(&page.ids, processor).await
    }

    /// Run over `ids` in order
    #[instrument(skip(self, ids, processor), fields(kind = %processor.kind(), run_id = tracing::field::Empty))]
    pub async fn run(&self, ids: &[ItemId], processor: &dyn ItemProcessor) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let kind = processor.kind();
        match self.run_items(run_id, kind, ids, processor).await {
            Ok(report) => {
                self.store.reset(kind).await?;
                info!(
                    outcome = %report.outcome,
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Batch finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Batch aborted");
                if let Err(reset_err) = self.store.reset(kind).await {
                    warn!(error = %reset_err, "Failed to reset batch state after abort");
                }
                Err(e)
            }
        }
    }

    async fn run_items(
        &self,
        run_id: Uuid,
        kind: BatchKind,
        ids: &[ItemId],
        processor: &dyn ItemProcessor,
    ) -> Result<RunReport> {
        let total = ids.len() as u64;
        let started_at = Utc::now();

        self.store.reset(kind).await?;
        self.store.set_status(kind, true).await?;
        self.store.set_total_count(kind, total).await?;

        info!(total, "Batch started");

        let mut report = RunReport {
            run_id,
            kind,
            total,
            processed: 0,
            skipped: 0,
            failed: 0,
            outcome: RunOutcome::Completed,
            started_at,
            finished_at: started_at,
        };

        for (index, &item_id) in ids.iter().enumerate() {
            if self.store.should_cancel(kind).await? {
                info!(position = index, "Cancellation observed");
                report.outcome = RunOutcome::Cancelled;
                break;
            }

            let position = index as u64 + 1;
            self.store.set_current(kind, position).await?;

            let (file, status) = self.process_one(kind, item_id, position, processor).await?;
            match status {
                ItemStatus::Processed => report.processed += 1,
                ItemStatus::Skipped => report.skipped += 1,
                ItemStatus::Failed => report.failed += 1,
            }

            if let Some(callback) = &self.progress {
                callback(&ItemProgress {
                    kind,
                    position,
                    total,
                    item_id,
                    file,
                    status,
                });
            }
        }

        self.store.record_outcome(kind, report.outcome).await?;
        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Errors returned here come from the batch store and end the run
    async fn process_one(
        &self,
        kind: BatchKind,
        item_id: ItemId,
        position: u64,
        processor: &dyn ItemProcessor,
    ) -> Result<(String, ItemStatus)> {
        let item = match self.catalog.find_by_id(item_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(item_id = %item_id, position, "Item no longer in catalog, skipping");
                self.store.set_current_file(kind, "").await?;
                return Ok((String::new(), ItemStatus::Skipped));
            }
            Err(e) => {
                error!(item_id = %item_id, position, error = %e, "Failed to load item");
                return Ok((String::new(), ItemStatus::Failed));
            }
        };

        let file = item.file_name().to_string();
        self.store.set_current_file(kind, &file).await?;

        let status = match processor.process(&item).await {
            Ok(()) => {
                debug!(item_id = %item_id, position, file = %file, "Item processed");
                ItemStatus::Processed
            }
            Err(e) if e.is_missing_file() => {
                warn!(item_id = %item_id, position, file = %file, "File missing, skipping");
                ItemStatus::Skipped
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(item_id = %item_id, position, file = %file, error = %e, "Item failed");
                ItemStatus::Failed
            }
        };

        Ok((file, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchState;
    use crate::store::InMemoryBatchStateStore;
    use crate::MigrationError;
    use core_library::db::create_test_pool;
    use core_library::{NewCatalogItem, SqliteCatalogRepository};
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    mock! {
        Store {}

        #[async_trait]
        impl BatchStateStore for Store {
            async fn reset(&self, kind: BatchKind) -> Result<()>;
            async fn set_status(&self, kind: BatchKind, running: bool) -> Result<()>;
            async fn set_total_count(&self, kind: BatchKind, total: u64) -> Result<()>;
            async fn set_current(&self, kind: BatchKind, current: u64) -> Result<()>;
            async fn set_current_file(&self, kind: BatchKind, name: &str) -> Result<()>;
            async fn set_should_cancel(&self, kind: BatchKind, cancel: bool) -> Result<()>;
            async fn should_cancel(&self, kind: BatchKind) -> Result<bool>;
            async fn record_outcome(&self, kind: BatchKind, outcome: RunOutcome) -> Result<()>;
            async fn snapshot(&self, kind: BatchKind) -> Result<BatchState>;
        }
    }

    /// Processor that counts calls and fails on chosen files
    struct CountingProcessor {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl CountingProcessor {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl ItemProcessor for CountingProcessor {
        fn kind(&self) -> BatchKind {
            BatchKind::Unlink
        }

        async fn process(&self, item: &CatalogItem) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(item.file_name()) == self.fail_on {
                return Err(MigrationError::StorageEnabled);
            }
            Ok(())
        }
    }

    async fn catalog(files: &[&str]) -> (Arc<SqliteCatalogRepository>, Vec<ItemId>) {
        let catalog = Arc::new(SqliteCatalogRepository::new(create_test_pool().await.unwrap()));
        let mut ids = Vec::new();
        for file in files {
            let id = catalog
                .insert(
                    &NewCatalogItem::new(*file, "image/jpeg", format!("https://example.com/{}", file)),
                    None,
                )
                .await
                .unwrap();
            ids.push(id);
        }
        (catalog, ids)
    }

    #[tokio::test]
    async fn test_failures_and_vanished_items_do_not_stop_the_run() {
        let (catalog, mut ids) = catalog(&["a.jpg", "b.jpg", "c.jpg"]).await;
        ids.insert(1, ItemId(4242));

        let store = Arc::new(InMemoryBatchStateStore::new());
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let pipeline = MigrationPipeline::new(catalog, store.clone()).with_progress(Arc::new(
            move |progress: &ItemProgress| {
                sink.lock().unwrap().push((progress.position, progress.status));
            },
        ));

        let processor = CountingProcessor::new(Some("b.jpg"));
        let report = pipeline.run(&ids, &processor).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.total, 4);
        assert_eq!(
            (report.processed, report.skipped, report.failed),
            (2, 1, 1)
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                (1, ItemStatus::Processed),
                (2, ItemStatus::Skipped),
                (3, ItemStatus::Failed),
                (4, ItemStatus::Processed),
            ]
        );

        let state = store.snapshot(BatchKind::Unlink).await.unwrap();
        assert!(!state.running);
        assert_eq!(state.current, 0);
        assert_eq!(state.last_outcome, Some(RunOutcome::Completed));
    }

    #[tokio::test]
    async fn test_run_query_applies_bounds() {
        let (catalog, _) = catalog(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]).await;
        let pipeline = MigrationPipeline::new(catalog, Arc::new(InMemoryBatchStateStore::new()));

        let processor = CountingProcessor::new(None);
        let report = pipeline
            .run_query(
                QueryBounds::all().with_limit(2).with_page(2),
                ItemFilter::All,
                &processor,
            )
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 2);
    }

    #[tokio::test]
    async fn test_batch_store_failure_is_fatal() {
        let (catalog, ids) = catalog(&["a.jpg", "b.jpg", "c.jpg"]).await;

        let mut store = MockStore::new();
        store.expect_reset().times(2).returning(|_| Ok(()));
        store.expect_set_status().returning(|_, _| Ok(()));
        store.expect_set_total_count().returning(|_, _| Ok(()));
        store.expect_set_should_cancel().returning(|_, _| Ok(()));
        store.expect_should_cancel().returning(|_| Ok(false));
        store.expect_set_current_file().returning(|_, _| Ok(()));
        store.expect_set_current().returning(|_, position| {
            if position == 2 {
                Err(MigrationError::BatchState("disk I/O error".to_string()))
            } else {
                Ok(())
            }
        });
        store.expect_record_outcome().never();

        let pipeline = MigrationPipeline::new(catalog, Arc::new(store));
        let processor = CountingProcessor::new(None);
        let result = pipeline.run(&ids, &processor).await;

        assert!(matches!(result, Err(ref e) if e.is_fatal()));
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    /// Store whose observer cancels as soon as a run is marked running
    struct EagerCancelStore {
        inner: InMemoryBatchStateStore,
    }

    #[async_trait]
    impl BatchStateStore for EagerCancelStore {
        async fn reset(&self, kind: BatchKind) -> Result<()> {
            self.inner.reset(kind).await
        }
        async fn set_status(&self, kind: BatchKind, running: bool) -> Result<()> {
            self.inner.set_status(kind, running).await?;
            if running {
                self.inner.set_should_cancel(kind, true).await?;
            }
            Ok(())
        }
        async fn set_total_count(&self, kind: BatchKind, total: u64) -> Result<()> {
            self.inner.set_total_count(kind, total).await
        }
        async fn set_current(&self, kind: BatchKind, current: u64) -> Result<()> {
            self.inner.set_current(kind, current).await
        }
        async fn set_current_file(&self, kind: BatchKind, name: &str) -> Result<()> {
            self.inner.set_current_file(kind, name).await
        }
        async fn set_should_cancel(&self, kind: BatchKind, cancel: bool) -> Result<()> {
            self.inner.set_should_cancel(kind, cancel).await
        }
        async fn should_cancel(&self, kind: BatchKind) -> Result<bool> {
            self.inner.should_cancel(kind).await
        }
        async fn record_outcome(&self, kind: BatchKind, outcome: RunOutcome) -> Result<()> {
            self.inner.record_outcome(kind, outcome).await
        }
        async fn snapshot(&self, kind: BatchKind) -> Result<BatchState> {
            self.inner.snapshot(kind).await
        }
    }

    #[tokio::test]
    async fn test_cancel_raised_at_start_is_honored() {
        let (catalog, ids) = catalog(&["a.jpg", "b.jpg"]).await;
        let store = Arc::new(EagerCancelStore {
            inner: InMemoryBatchStateStore::new(),
        });
        let pipeline = MigrationPipeline::new(catalog, store.clone());

        let processor = CountingProcessor::new(None);
        let report = pipeline.run(&ids, &processor).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.visited(), 0);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.snapshot(BatchKind::Unlink).await.unwrap().last_outcome,
            Some(RunOutcome::Cancelled)
        );
    }
}
