//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retry and exponential backoff
//! - `FileSystemAccess` using `tokio::fs`
//! - `ObjectStore` layered over any `HttpClient` (S3-compatible, path-style)
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::{HttpObjectStore, ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http = Arc::new(ReqwestHttpClient::new()?);
//!     let store = HttpObjectStore::new(http, "s3", "https://s3.example.com", "media")?;
//!     let fs = TokioFileSystem::new();
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;
mod object_store;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use object_store::HttpObjectStore;
