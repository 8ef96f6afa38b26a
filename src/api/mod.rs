// src/api/mod.rs
//
// Hand-rolled `hyper::service::service_fn` router, generalized from the
// inherited `main.rs`'s `start_metrics_server` (its only existing example
// of a second hyper listener doing manual path matching by hand) to the
// full route table.
mod error;

pub use error::ApiError;

use crate::config::{Config, HealthCheckConfig, LoadBalancingAlgorithm};
use crate::metrics::MetricsRegistry;
use crate::proxy::ProxyEngine;
use crate::registry::{BackendPatch, BackendSpec, Registry};
use crate::strategy::Strategy;
use hyper::header::AUTHORIZATION;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use url::Url;

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct CreateServerBody {
    id: String,
    url: Url,
    #[serde(default = "default_weight")]
    weight: u32,
}

#[derive(Debug, Deserialize, Default)]
struct UpdateServerBody {
    url: Option<Url>,
    weight: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SetAlgorithmBody {
    algorithm: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView {
    algorithm: &'static str,
    health_check: HealthCheckConfigView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthCheckConfigView {
    interval_seconds: u64,
    timeout_seconds: u64,
    path: String,
}

#[derive(Debug, Serialize)]
struct PingResponse {
    message: &'static str,
}

/// Holds the one shared instance of each control-plane object reached by
/// both this listener and the proxy listener (spec §4.6: "there is exactly
/// one instance of each shared state object per process").
#[derive(Clone)]
pub struct ManagementApi {
    registry: Arc<Registry>,
    engine: Arc<ProxyEngine>,
    metrics_registry: Arc<MetricsRegistry>,
    health_check: HealthCheckConfig,
    auth_token: Option<String>,
    metrics_path: String,
    metrics_enabled: bool,
}

impl ManagementApi {
    pub fn new(
        registry: Arc<Registry>,
        engine: Arc<ProxyEngine>,
        metrics_registry: Arc<MetricsRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            engine,
            metrics_registry,
            health_check: config.health_check.clone(),
            auth_token: config.management.auth_token.clone(),
            metrics_path: config.metrics.path.clone(),
            metrics_enabled: config.metrics.enabled,
        }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        match self.route(req).await {
            Ok(response) => response,
            Err(err) => Response::<Body>::from(err),
        }
    }

    async fn route(&self, req: Request<Body>) -> Result<Response<Body>, ApiError> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if self.metrics_enabled && method == Method::GET && path == self.metrics_path {
            return Ok(self.prometheus_text());
        }

        if matches!(method, Method::POST | Method::PUT | Method::DELETE) {
            self.check_auth(&req)?;
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method.clone(), segments.as_slice()) {
            (Method::GET, ["api", "v1", "servers"]) => self.list_servers().await,
            (Method::POST, ["api", "v1", "servers"]) => self.create_server(req).await,
            (Method::GET, ["api", "v1", "servers", id]) => self.get_server(id).await,
            (Method::PUT, ["api", "v1", "servers", id]) => self.update_server(id, req).await,
            (Method::DELETE, ["api", "v1", "servers", id]) => self.delete_server(id).await,
            (Method::GET, ["api", "v1", "config"]) => self.get_config(),
            (Method::PUT, ["api", "v1", "config", "algorithm"]) => {
                self.set_algorithm(req).await
            }
            (Method::GET, ["api", "v1", "metrics"]) => self.get_metrics(),
            (Method::GET, ["api", "v1", "ping"]) => self.ping(),
            _ => Err(ApiError::NotFound(path)),
        }
    }

    fn check_auth(&self, req: &Request<Body>) -> Result<(), ApiError> {
        let Some(expected) = &self.auth_token else {
            return Ok(());
        };
        let provided = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match provided {
            Some(token) if token == expected => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        &self,
        req: Request<Body>,
    ) -> Result<T, ApiError> {
        let bytes = hyper::body::to_bytes(req.into_body())
            .await
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidBody(e.to_string()))
    }

    fn json_response(status: StatusCode, body: impl Serialize) -> Response<Body> {
        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn list_servers(&self) -> Result<Response<Body>, ApiError> {
        let servers = self.registry.list().await;
        Ok(Self::json_response(StatusCode::OK, servers))
    }

    async fn create_server(&self, req: Request<Body>) -> Result<Response<Body>, ApiError> {
        let body: CreateServerBody = self.read_json(req).await?;
        let snapshot = self
            .registry
            .add(BackendSpec {
                id: body.id,
                url: body.url,
                weight: body.weight,
            })
            .await?;
        Ok(Self::json_response(StatusCode::CREATED, snapshot))
    }

    async fn get_server(&self, id: &str) -> Result<Response<Body>, ApiError> {
        let snapshot = self.registry.get(id).await?;
        Ok(Self::json_response(StatusCode::OK, snapshot))
    }

    async fn update_server(
        &self,
        id: &str,
        req: Request<Body>,
    ) -> Result<Response<Body>, ApiError> {
        let body: UpdateServerBody = self.read_json(req).await?;
        let snapshot = self
            .registry
            .update(
                id,
                BackendPatch {
                    url: body.url,
                    weight: body.weight,
                },
            )
            .await?;
        Ok(Self::json_response(StatusCode::OK, snapshot))
    }

    async fn delete_server(&self, id: &str) -> Result<Response<Body>, ApiError> {
        self.registry.remove(id).await?;
        self.metrics_registry.collector().retire_backend(id);
        Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .unwrap())
    }

    fn get_config(&self) -> Result<Response<Body>, ApiError> {
        let view = ConfigView {
            algorithm: self.engine.strategy_name(),
            health_check: HealthCheckConfigView {
                interval_seconds: self.health_check.interval_seconds,
                timeout_seconds: self.health_check.timeout_seconds,
                path: self.health_check.path.clone(),
            },
        };
        Ok(Self::json_response(StatusCode::OK, view))
    }

    async fn set_algorithm(&self, req: Request<Body>) -> Result<Response<Body>, ApiError> {
        let body: SetAlgorithmBody = self.read_json(req).await?;
        let algorithm = LoadBalancingAlgorithm::parse(&body.algorithm).ok_or_else(|| {
            ApiError::InvalidAlgorithm(format!("unknown algorithm: {}", body.algorithm))
        })?;
        self.engine.set_strategy(Strategy::new(algorithm));
        Ok(Self::json_response(
            StatusCode::OK,
            json!({ "algorithm": algorithm.as_str() }),
        ))
    }

    fn get_metrics(&self) -> Result<Response<Body>, ApiError> {
        let snapshot = self.metrics_registry.collector().snapshot();
        Ok(Self::json_response(StatusCode::OK, snapshot))
    }

    fn ping(&self) -> Result<Response<Body>, ApiError> {
        Ok(Self::json_response(
            StatusCode::OK,
            PingResponse { message: "pong" },
        ))
    }

    fn prometheus_text(&self) -> Response<Body> {
        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(Body::from(self.metrics_registry.gather()))
            .unwrap()
    }
}
