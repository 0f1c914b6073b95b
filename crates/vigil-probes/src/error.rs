//! Probe construction errors.

use thiserror::Error;

/// Errors raised while building a probe from its configuration.
#[derive(Debug, Error)]
pub enum ProbeConfigError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("unsupported URL scheme {0:?} (only http is supported)")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("address must not be empty")]
    EmptyAddress,

    #[error("invalid address {0:?}, expected host:port")]
    InvalidAddress(String),

    #[error("invalid gRPC endpoint {address:?}: {reason}")]
    InvalidEndpoint { address: String, reason: String },
}

pub type ProbeConfigResult<T> = Result<T, ProbeConfigError>;
