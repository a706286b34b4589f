//! Error types for the reconciliation core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared across the reconciliation pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Monitor (router or direct/Docker source) error.
    #[error("monitor error: {0}")]
    Monitor(String),

    /// DNS provider-related error.
    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    /// Record tracker (persistent index) error.
    #[error("record tracker error: {0}")]
    Tracker(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO error.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error (router API or DNS provider API).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication failure.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Provider rate-limited the request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Requested record/zone not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input (label value, record config, hostname).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error, tagged with the provider name.
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Provider name (e.g. "cloudflare").
        provider: String,
        /// Error message.
        message: String,
    },

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Monitor`].
    pub fn monitor(msg: impl Into<String>) -> Self {
        Self::Monitor(msg.into())
    }

    /// Build a [`Error::DnsProvider`].
    pub fn dns_provider(msg: impl Into<String>) -> Self {
        Self::DnsProvider(msg.into())
    }

    /// Build a [`Error::Tracker`].
    pub fn tracker(msg: impl Into<String>) -> Self {
        Self::Tracker(msg.into())
    }

    /// Build a [`Error::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`Error::Http`].
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Build a [`Error::Authentication`].
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Build a [`Error::RateLimited`].
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Build a [`Error::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`Error::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a [`Error::Provider`].
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
