// src/proxy/error.rs
//
// Grounded on the inherited `proxy::proxy::ProxyError` (same error shape
// and `From<ProxyError> for Response<Body>` conversion), extended with the
// `UpstreamTimeout`/`Internal` variants spec §7's taxonomy requires and
// with a JSON `{error:{code,message}}` body instead of a bare string.
use hyper::{Body, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no eligible backend available")]
    NoHealthyBackends,

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Closed error-code set from spec §7.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::NoHealthyBackends => "no_backends_available",
            ProxyError::UpstreamUnreachable(_) => "upstream_unreachable",
            ProxyError::UpstreamTimeout => "upstream_timeout",
            ProxyError::Internal(_) => "internal",
        }
    }
}

impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
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
