// src/registry/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("backend id already exists: {0}")]
    DuplicateId(String),

    #[error("backend not found: {0}")]
    NotFound(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("invalid backend weight: {0}")]
    InvalidWeight(String),
}

impl RegistryError {
    /// Closed error-code set from spec §7 ("User-visible failures").
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::DuplicateId(_) => "duplicate_id",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::InvalidUrl(_) => "invalid_url",
            RegistryError::InvalidWeight(_) => "invalid_weight",
        }
    }
}
