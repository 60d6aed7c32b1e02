//! Workspace umbrella crate.
//!
//! Re-exports the member crates so a host can depend on
//! `offline-worker-workspace` alone and pick the bridges it needs through
//! feature flags (`desktop-shims`, `sqlite-store`).

pub use bridge_traits;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

#[cfg(feature = "desktop-shims")]
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub use core_worker;
