// src/api/error.rs
//
// Grounded on the inherited per-module `thiserror::Error` convention
// (`RegistryError`, `ProxyError`, `ConfigError`) — the management API owns
// its own error enum per spec §7's propagation policy rather than reusing
// `RegistryError` directly, since unauthorized/bad-JSON-body are API-layer
// concerns the registry doesn't know about.
use crate::registry::RegistryError;
use hyper::{Body, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateId(_) => StatusCode::CONFLICT,
            ApiError::InvalidUrl(_) | ApiError::InvalidAlgorithm(_) | ApiError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Closed error-code set from spec §7, plus `unauthorized` for the
    /// management-listener-only bearer-token check.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::DuplicateId(_) => "duplicate_id",
            ApiError::InvalidUrl(_) => "invalid_url",
            ApiError::InvalidAlgorithm(_) => "invalid_algorithm",
            ApiError::InvalidBody(_) => "invalid_url",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateId(id) => ApiError::DuplicateId(id),
            RegistryError::NotFound(id) => ApiError::NotFound(id),
            RegistryError::InvalidUrl(msg) => ApiError::InvalidUrl(msg),
            RegistryError::InvalidWeight(msg) => ApiError::InvalidBody(msg),
        }
    }
}

impl From<ApiError> for Response<Body> {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        let body = json!({
            "error": {
                "code": err.code(),
                "message": err.to_string(),
            }
        });

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}
