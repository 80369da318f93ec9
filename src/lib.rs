//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-migration`, `core-library`, `core-imaging`). Hosts can depend
//! on `mediacloud-workspace` and enable the documented features without
//! wiring each crate individually.

#[cfg(feature = "imaging")]
pub use core_imaging as imaging;
#[cfg(feature = "migration")]
pub use core_library as library;
#[cfg(feature = "migration")]
pub use core_migration as migration;
