//! # Batch State Repository
//!
//! Persists batch progress in the catalog database so that a second process
//! (`mediacloud status`, `mediacloud cancel`) can observe and stop a run.
//!
//! Every setter is a single-column `UPDATE`; the cancellation flag written by
//! an observer is therefore never clobbered by the running writer.

use crate::batch::{BatchKind, BatchState, BatchStatus, RunOutcome};
use crate::store::BatchStateStore;
use crate::{MigrationError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// SQLite implementation of BatchStateStore
pub struct SqliteBatchStateStore {
    pool: SqlitePool,
}

impl SqliteBatchStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ensure_row(&self, kind: BatchKind) -> Result<()> {
        sqlx::query(
            "INSERT INTO batch_states (kind, updated_at) VALUES (?, ?) ON CONFLICT(kind) DO NOTHING",
        )
        .bind(kind.as_str())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, kind: BatchKind) -> Result<Option<BatchState>> {
        let row: Option<BatchStateRow> = sqlx::query_as(
            r#"
            SELECT kind, status, total, current, current_file, running,
                   cancel_requested, last_outcome, updated_at
            FROM batch_states WHERE kind = ?
            "#,
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BatchState::try_from).transpose()
    }

    /// Current record, validated against the state machine by `f`, with
    /// the row created if missing
    async fn checked(
        &self,
        kind: BatchKind,
        f: impl FnOnce(&mut BatchState) -> Result<()> + Send,
    ) -> Result<BatchState> {
        self.ensure_row(kind).await?;
        let mut state = self
            .load(kind)
            .await?
            .unwrap_or_else(|| BatchState::idle(kind));
        f(&mut state)?;
        Ok(state)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Database row representation of a batch record
#[derive(Debug, FromRow)]
struct BatchStateRow {
    kind: String,
    status: String,
    total: i64,
    current: i64,
    current_file: String,
    running: bool,
    cancel_requested: bool,
    last_outcome: Option<String>,
    updated_at: i64,
}

impl TryFrom<BatchStateRow> for BatchState {
    type Error = MigrationError;

    fn try_from(row: BatchStateRow) -> Result<Self> {
        Ok(BatchState {
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            total: row.total.max(0) as u64,
            current: row.current.max(0) as u64,
            current_file_name: row.current_file,
            running: row.running,
            cancel_requested: row.cancel_requested,
            last_outcome: row
                .last_outcome
                .as_deref()
                .map(str::parse::<RunOutcome>)
                .transpose()?,
            updated_at: DateTime::from_timestamp_millis(row.updated_at).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl BatchStateStore for SqliteBatchStateStore {
    async fn reset(&self, kind: BatchKind) -> Result<()> {
        self.ensure_row(kind).await?;
        sqlx::query(
            r#"
            UPDATE batch_states
            SET status = ?, total = 0, current = 0, current_file = '',
                running = 0, cancel_requested = 0, updated_at = ?
            WHERE kind = ?
            "#,
        )
        .bind(BatchStatus::Idle.as_str())
        .bind(now_millis())
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        debug!(kind = %kind, "Batch state reset");
        Ok(())
    }

    async fn set_status(&self, kind: BatchKind, running: bool) -> Result<()> {
        let state = self
            .checked(kind, |state| state.set_running(running))
            .await?;

        sqlx::query("UPDATE batch_states SET status = ?, running = ?, updated_at = ? WHERE kind = ?")
            .bind(state.status.as_str())
            .bind(running)
            .bind(now_millis())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_total_count(&self, kind: BatchKind, total: u64) -> Result<()> {
        self.ensure_row(kind).await?;
        sqlx::query("UPDATE batch_states SET total = ?, updated_at = ? WHERE kind = ?")
            .bind(total as i64)
            .bind(now_millis())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_current(&self, kind: BatchKind, current: u64) -> Result<()> {
        self.checked(kind, |state| state.set_current(current)).await?;

        sqlx::query("UPDATE batch_states SET current = ?, updated_at = ? WHERE kind = ?")
            .bind(current as i64)
            .bind(now_millis())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_current_file(&self, kind: BatchKind, name: &str) -> Result<()> {
        self.ensure_row(kind).await?;
        sqlx::query("UPDATE batch_states SET current_file = ?, updated_at = ? WHERE kind = ?")
            .bind(name)
            .bind(now_millis())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_should_cancel(&self, kind: BatchKind, cancel: bool) -> Result<()> {
        self.ensure_row(kind).await?;
        sqlx::query("UPDATE batch_states SET cancel_requested = ?, updated_at = ? WHERE kind = ?")
            .bind(cancel)
            .bind(now_millis())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn should_cancel(&self, kind: BatchKind) -> Result<bool> {
        let flag: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM batch_states WHERE kind = ?")
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(flag.is_some_and(|(cancel,)| cancel))
    }

    async fn record_outcome(&self, kind: BatchKind, outcome: RunOutcome) -> Result<()> {
        self.checked(kind, |state| state.finish(outcome)).await?;

        sqlx::query(
            "UPDATE batch_states SET status = ?, running = 0, last_outcome = ?, updated_at = ? WHERE kind = ?",
        )
        .bind(outcome.status().as_str())
        .bind(outcome.as_str())
        .bind(now_millis())
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn snapshot(&self, kind: BatchKind) -> Result<BatchState> {
        Ok(self
            .load(kind)
            .await?
            .unwrap_or_else(|| BatchState::idle(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::db::create_test_pool;

    async fn store() -> SqliteBatchStateStore {
        SqliteBatchStateStore::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_missing_row_reads_as_idle() {
        let store = store().await;
        let state = store.snapshot(BatchKind::Import).await.unwrap();

        assert_eq!(state.status, BatchStatus::Idle);
        assert!(!store.should_cancel(BatchKind::Import).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_is_persisted() {
        let store = store().await;
        let kind = BatchKind::RegenerateThumbnails;

        store.reset(kind).await.unwrap();
        store.set_status(kind, true).await.unwrap();
        store.set_total_count(kind, 5).await.unwrap();
        store.set_current(kind, 2).await.unwrap();
        store.set_current_file(kind, "photo.jpg").await.unwrap();

        let state = store.snapshot(kind).await.unwrap();
        assert_eq!(state.status, BatchStatus::Running);
        assert!(state.running);
        assert_eq!((state.current, state.total), (2, 5));
        assert_eq!(state.current_file_name, "photo.jpg");

        assert!(matches!(
            store.set_current(kind, 1).await,
            Err(MigrationError::ProgressRegression { .. })
        ));

        store.record_outcome(kind, RunOutcome::Completed).await.unwrap();
        store.reset(kind).await.unwrap();

        let state = store.snapshot(kind).await.unwrap();
        assert_eq!(state.status, BatchStatus::Idle);
        assert!(!state.running);
        assert_eq!(state.current, 0);
        assert_eq!(state.last_outcome, Some(RunOutcome::Completed));
    }

    #[tokio::test]
    async fn test_cancel_flag_survives_progress_updates() {
        let store = store().await;
        let kind = BatchKind::Import;

        store.reset(kind).await.unwrap();
        store.set_status(kind, true).await.unwrap();
        store.set_should_cancel(kind, true).await.unwrap();
        store.set_current(kind, 1).await.unwrap();
        store.set_status(kind, true).await.unwrap();

        assert!(store.should_cancel(kind).await.unwrap());

        store.record_outcome(kind, RunOutcome::Cancelled).await.unwrap();
        store.reset(kind).await.unwrap();
        assert!(!store.should_cancel(kind).await.unwrap());
        assert_eq!(
            store.snapshot(kind).await.unwrap().last_outcome,
            Some(RunOutcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_outcome_requires_running_record() {
        let store = store().await;
        assert!(matches!(
            store
                .record_outcome(BatchKind::Unlink, RunOutcome::Completed)
                .await,
            Err(MigrationError::InvalidStateTransition { .. })
        ));
    }
}
