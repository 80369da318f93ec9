//! # Image Transform Module
//!
//! Geometry planning and location-transparent image editing.
//!
//! ## Overview
//!
//! - [`geometry`]: pure fit-within / cover-crop planning
//! - [`editor`]: the `ImageEditor` capability and asset location
//! - [`LocalImageEditor`]: pixels on the local filesystem (`image` crate)
//! - [`RemoteImageEditor`]: objects in remote storage; edits are deferred
//!   until save
//! - [`TransformCoordinator`]: picks the editor for an asset and tracks its
//!   logical size
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_imaging::{EditorContext, TransformCoordinator};
//!
//! let ctx = EditorContext::new(fs, scratch_dir).with_store(store).with_catalog(catalog);
//! let mut coordinator = TransformCoordinator::load(&item.guid, &ctx).await?;
//! let sizes = coordinator.multi_resize(&config.derivative_sizes).await?;
//! ```

pub mod coordinator;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod local;
pub mod remote;

#[cfg(test)]
mod test_support;

pub use coordinator::{resolve_location, EditorContext, TransformCoordinator};
pub use editor::{AssetLocation, DerivativeResult, ImageEditor, ImageMetadata};
pub use error::{ImagingError, Result};
pub use geometry::{cover_crop, fit_within, plan_resize, Rect, ResizePlan, Size};
pub use local::LocalImageEditor;
pub use remote::RemoteImageEditor;
