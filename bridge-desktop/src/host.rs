//! Local hosting runtime

use async_trait::async_trait;
use bridge_traits::{error::Result, host::HostRuntime};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Host runtime for native embeddings.
///
/// There is no browser deciding which worker controls which page, so this
/// records the takeover requests and lets the embedding proxy consult them.
#[derive(Debug, Default)]
pub struct LocalHostRuntime {
    waiting_skipped: AtomicBool,
    clients_claimed: AtomicBool,
}

impl LocalHostRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the worker asked to activate without waiting
    pub fn waiting_skipped(&self) -> bool {
        self.waiting_skipped.load(Ordering::SeqCst)
    }

    /// Whether the worker took control of already-open clients
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostRuntime for LocalHostRuntime {
    async fn skip_waiting(&self) -> Result<()> {
        info!("Worker requested immediate activation");
        self.waiting_skipped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        info!("Worker claimed open clients");
        self.clients_claimed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_takeover_requests() {
        let host = LocalHostRuntime::new();
        assert!(!host.waiting_skipped());
        assert!(!host.clients_claimed());

        host.skip_waiting().await.unwrap();
        assert!(host.waiting_skipped());
        assert!(!host.clients_claimed());

        host.claim_clients().await.unwrap();
        assert!(host.clients_claimed());
    }
}
