use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Invalid asset reference: {0}")]
    InvalidReference(String),

    #[error("Editor used before load()")]
    NotLoaded,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Remote transfer failed: {0}")]
    Transfer(#[from] BridgeError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] LibraryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ImagingError {
    /// True for failures talking to remote storage
    pub fn is_transfer(&self) -> bool {
        matches!(self, ImagingError::Transfer(_))
    }
}

pub type Result<T> = std::result::Result<T, ImagingError>;
