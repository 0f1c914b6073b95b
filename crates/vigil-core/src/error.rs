//! Checker error types.

use thiserror::Error;

/// Errors raised while building a checker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("failed to parse checker config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read checker config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the checker's public surface.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("checker already started")]
    AlreadyStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type CheckerResult<T> = Result<T, CheckerError>;
