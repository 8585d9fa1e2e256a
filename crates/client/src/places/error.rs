//! Places provider error types.

/// Errors from a places provider or geocoder adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Request rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed (invalid or missing API key).
    #[error("authentication failed")]
    AuthError,

    /// Rate limited by the provider.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// The call did not complete in time.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Timeout | ProviderError::Network(_) => true,
            ProviderError::HttpError { status } => *status >= 500,
            ProviderError::InvalidRequest(_) | ProviderError::AuthError | ProviderError::Parse(_) => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for ProviderError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProviderError::Timeout
    }
}
