// src/config/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate backend id in config: {0}")]
    DuplicateBackendId(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("invalid algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}
