use thiserror::Error;
use vendorsync_client::ProviderError;
use vendorsync_core::ConfigError;

/// Errors surfaced by the search engine and its background workers.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Every provider sub-query failed; carries the last failure.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(ProviderError),
}

/// Why a background task failed.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("invalid task payload: {0}")]
    InvalidPayload(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("task handler panicked")]
    Panicked,
}

impl TaskError {
    /// Whether running the same task again can succeed. Malformed payloads
    /// and permanent provider rejections cannot.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::InvalidPayload(_) => false,
            TaskError::Provider(e) => e.is_transient(),
            TaskError::Engine(_) | TaskError::Panicked => true,
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::InvalidPayload(err.to_string())
    }
}
