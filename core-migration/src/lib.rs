//! # Migration Module
//!
//! Resumable, cancellable batch runs over the media catalog.
//!
//! ## Overview
//!
//! This module manages:
//! - Per-kind progress records that observers can poll and cancel
//! - A single-worker pipeline that walks catalog items, skips missing files
//!   and isolates per-item failures
//! - The item processors for importing to remote storage, regenerating
//!   derivative metadata and unlinking from remote storage
//!
//! ## Components
//!
//! - **Batch State** (`batch`, `store`, `repository`): records, the store
//!   trait with in-memory and SQLite implementations, and `ProgressHandle`
//! - **Pipeline** (`pipeline`): the run loop and its `RunReport`
//! - **Processors** (`processors`): `ImportProcessor`, `RegenerateProcessor`,
//!   `UnlinkProcessor`

pub mod batch;
pub mod error;
pub mod pipeline;
pub mod processors;
pub mod repository;
pub mod store;

pub use batch::{BatchKind, BatchState, BatchStatus, RunOutcome};
pub use error::{MigrationError, Result};
pub use pipeline::{
    ItemProcessor, ItemProgress, ItemStatus, MigrationPipeline, ProgressCallback, RunReport,
};
pub use processors::{ImportProcessor, RegenerateProcessor, UnlinkProcessor};
pub use repository::SqliteBatchStateStore;
pub use store::{BatchStateStore, InMemoryBatchStateStore, ProgressHandle};
