use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to cache required asset {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Cache storage error: {0}")]
    Storage(#[source] BridgeError),

    #[error("Host runtime error: {0}")]
    Host(#[source] BridgeError),

    #[error(transparent)]
    Config(#[from] core_runtime::Error),

    #[error("Invalid worker state: {0}")]
    InvalidState(String),

    #[error("Worker task has stopped")]
    Stopped,
}

impl WorkerError {
    /// Whether the generation could not be seeded with its required assets.
    pub fn is_install_failure(&self) -> bool {
        matches!(self, WorkerError::InstallFailed { .. } | WorkerError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
