//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for catalog data access.
//!
//! ## Architecture
//!
//! - Traits define the interface the migration core depends on
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Bounded id queries use [`QueryBounds`] and return an [`IdPage`]

pub mod catalog;
pub mod pagination;

pub use catalog::{CatalogRepository, ItemFilter, SqliteCatalogRepository};
pub use pagination::{IdPage, QueryBounds};
