use std::sync::Arc;

/// Result type used throughout the SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gatekit client.
///
/// Only configuration errors are ever returned to the caller directly. Transport failures are
/// logged and reported through [`InitHandle`](crate::InitHandle); lookups and event logging
/// never fail.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// API key is missing or is not a client key.
    #[error("invalid api_key, expected a client key (client-...)")]
    InvalidApiKey,

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// Server responded with a non-success status.
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(u16),

    /// `initialize()` was called more than once.
    #[error("client is already initialized")]
    AlreadyInitialized,

    /// The operation requires `initialize()` to be called first.
    #[error("client is not initialized")]
    NotInitialized,

    /// A background thread panicked. This should normally never happen.
    #[error("background worker panicked")]
    WorkerPanicked,

    /// Timed out waiting for a completion signal.
    #[error("timed out waiting for initialization")]
    Timeout,

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Failed to encode or decode a payload.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(value))
    }
}
