//! # Host Bridge Traits
//!
//! Capability traits that the media core requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the core crates and the
//! environment-specific implementations. Each trait represents a capability
//! the core needs but does not own: reading and writing local files, talking
//! HTTP, and moving bytes in and out of a remote object store.
//!
//! ## Traits
//!
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Local file I/O and scratch space
//! - [`ObjectStore`](storage::ObjectStore) - Remote object storage (upload, fetch, existence)
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry
//!
//! ## Implementations
//!
//! | Host     | Implementation Crate |
//! |----------|----------------------|
//! | Desktop  | `bridge-desktop`     |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert their native errors and keep the offending path or URL in
//! the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across tasks behind an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::storage::ObjectStore;
//! use bytes::Bytes;
//!
//! async fn publish(store: &dyn ObjectStore, data: Bytes) -> bridge_traits::error::Result<String> {
//!     let stored = store.upload("2024/05/photo.jpg", data, "image/jpeg").await?;
//!     Ok(stored.url)
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileMetadata, FileSystemAccess, ObjectStore, StoredObject};
