//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the media cloud core:
//! - Logging and tracing infrastructure
//! - Configuration management (storage backend, derivative sizes)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the domain crates and the
//! `mediacloud` binary depend on. It establishes the logging conventions and
//! the validated configuration object the rest of the system is built from.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
