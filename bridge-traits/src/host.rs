//! Hosting Runtime Control
//!
//! The runtime that loads the worker decides when a new generation may take
//! over. These are the two levers the worker pulls on it.

use crate::{error::Result, platform::PlatformSendSync};

/// Control interface of the hosting runtime.
///
/// - **Web**: `self.skipWaiting()` and `self.clients.claim()`
/// - **Desktop**: the embedding proxy decides which worker answers requests
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait HostRuntime: PlatformSendSync {
    /// Activate this worker without waiting for clients of the previous one to close
    async fn skip_waiting(&self) -> Result<()>;

    /// Take control of pages that are already open, not only future ones
    async fn claim_clients(&self) -> Result<()>;
}
