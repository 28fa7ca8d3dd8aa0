use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the focus manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("worker did not become ready within {0:?}")]
    InitializationTimeout(Duration),
    #[error("worker exited before becoming ready")]
    WorkerExited,
    #[error("focus worker is not running")]
    NotRunning,
    #[error("no analysis reply within {0:?}")]
    RequestTimeout(Duration),
    #[error("monitoring was stopped before the reply arrived")]
    Stopped,
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("failed to launch worker: {0}")]
    Launch(String),
}

impl EngineError {
    /// Transient failures may succeed on a fresh request.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::RequestTimeout(_))
    }
}
