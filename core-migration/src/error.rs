use bridge_traits::error::BridgeError;
use core_imaging::ImagingError;
use core_library::{ItemId, LibraryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("File of item {item_id} is missing: {path}")]
    ItemFileMissing { item_id: ItemId, path: String },

    #[error("Remote transfer of {key} failed: {source}")]
    RemoteTransferFailed {
        key: String,
        #[source]
        source: BridgeError,
    },

    #[error("Batch state unavailable: {0}")]
    BatchState(String),

    #[error("Invalid batch transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Progress for {kind} cannot move back from {current} to {requested}")]
    ProgressRegression {
        kind: String,
        current: u64,
        requested: u64,
    },

    #[error("Unknown batch kind: {0}")]
    UnknownKind(String),

    #[error("Remote storage is still enabled")]
    StorageEnabled,

    #[error("Catalog error: {0}")]
    Catalog(#[from] LibraryError),

    #[error("Imaging error: {0}")]
    Imaging(#[from] ImagingError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl MigrationError {
    /// Errors that end a whole run rather than a single item
    pub fn is_fatal(&self) -> bool {
        matches!(self, MigrationError::BatchState(_))
    }

    /// Missing items are skipped, not failed
    pub fn is_missing_file(&self) -> bool {
        matches!(self, MigrationError::ItemFileMissing { .. })
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::BatchState(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
