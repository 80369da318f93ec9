//! # Media Catalog Module
//!
//! Owns the media catalog database and provides repository patterns for data
//! access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Catalog items (uploaded attachments) and their per-item metadata
//!   documents: dimensions, derivative sizes and remote-storage markers
//! - Bounded id queries (`limit`/`offset`/`page`) used to drive batch runs
//!
//! The batch progress table lives in the same database; its repository is
//! owned by `core-migration`.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{AttachmentMetadata, CatalogItem, DerivativeMetadata, ItemId, NewCatalogItem, RemoteMarker};
pub use repositories::{CatalogRepository, IdPage, ItemFilter, QueryBounds, SqliteCatalogRepository};
