// src/config/models.rs
//
// Not present in the retrieved teacher pack (only referenced via `mod
// models; pub use models::*;` in config/mod.rs, never included) — written
// fresh against the usage sites in the teacher's other modules
// (`BackendConfig`, `HealthCheckConfig` with `.interval()`/`.timeout()`,
// `RetryConfig`) plus spec §4.7's full configuration surface.
use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancingAlgorithm {
    #[serde(rename = "roundrobin")]
    RoundRobin,
    Weighted,
    #[serde(rename = "leastconnections")]
    LeastConnections,
    #[serde(rename = "iphash")]
    IpHash,
}

impl LoadBalancingAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "roundrobin" => Some(Self::RoundRobin),
            "weighted" => Some(Self::Weighted),
            "leastconnections" => Some(Self::LeastConnections),
            "iphash" => Some(Self::IpHash),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "roundrobin",
            Self::Weighted => "weighted",
            Self::LeastConnections => "leastconnections",
            Self::IpHash => "iphash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub id: String,
    pub url: Url,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    #[serde(default = "default_health_path")]
    pub path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            timeout_seconds: 2,
            path: default_health_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ManagementConfig {
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    pub load_balancer_port: u16,
    pub api_port: u16,
    #[serde(default)]
    pub backend_servers: Vec<BackendConfig>,
    pub load_balancing_algorithm: LoadBalancingAlgorithm,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sticky: bool,
    /// Grace period for draining in-flight requests on shutdown (spec §6,
    /// §4.8). Ambient addition; not named in the distilled spec's
    /// configuration-file field list but required by its "Exit codes"
    /// section's drain behavior.
    #[serde(default = "default_shutdown_grace_period_ms")]
    pub shutdown_grace_period_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_shutdown_grace_period_ms() -> u64 {
    10_000
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }

    /// Cross-field validation (spec §4.7): duplicate ids, unsupported
    /// schemes, sticky/algorithm conflict, and port collisions are all
    /// rejected before the process boots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backend_servers {
            if !seen.insert(backend.id.clone()) {
                return Err(ConfigError::DuplicateBackendId(backend.id.clone()));
            }
            if backend.url.scheme() != "http" && backend.url.scheme() != "https" {
                return Err(ConfigError::InvalidUrl(format!(
                    "backend {}: unsupported scheme {}",
                    backend.id,
                    backend.url.scheme()
                )));
            }
        }

        if self.sticky && self.load_balancing_algorithm != LoadBalancingAlgorithm::IpHash {
            return Err(ConfigError::InvalidAlgorithm(
                "sticky=true requires loadBalancingAlgorithm=iphash".to_string(),
            ));
        }

        if self.health_check.interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "healthCheck.intervalSeconds must be > 0".to_string(),
            ));
        }
        if self.health_check.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "healthCheck.timeoutSeconds must be > 0".to_string(),
            ));
        }

        let mut ports = vec![("loadBalancerPort", self.load_balancer_port), ("apiPort", self.api_port)];
        if self.metrics.enabled {
            ports.push(("metrics.port", self.metrics.port));
        }
        for i in 0..ports.len() {
            for j in (i + 1)..ports.len() {
                if ports[i].1 == ports[j].1 {
                    return Err(ConfigError::InvalidValue(format!(
                        "{} and {} must not share a port ({})",
                        ports[i].0, ports[j].0, ports[i].1
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        Config {
            load_balancer_port: 8080,
            api_port: 8081,
            backend_servers: vec![],
            load_balancing_algorithm: LoadBalancingAlgorithm::RoundRobin,
            health_check: HealthCheckConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            management: ManagementConfig::default(),
            metrics: MetricsConfig::default(),
            sticky: false,
            shutdown_grace_period_ms: default_shutdown_grace_period_ms(),
        }
    }

    #[test]
    fn empty_backend_list_is_valid() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn sticky_without_iphash_is_rejected() {
        let mut config = minimal_config();
        config.sticky = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAlgorithm(_)));
    }

    #[test]
    fn sticky_with_iphash_is_accepted() {
        let mut config = minimal_config();
        config.sticky = true;
        config.load_balancing_algorithm = LoadBalancingAlgorithm::IpHash;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_backend_ids_rejected() {
        let mut config = minimal_config();
        config.backend_servers = vec![
            BackendConfig {
                id: "s1".into(),
                url: Url::parse("http://127.0.0.1:9001").unwrap(),
                weight: 1,
            },
            BackendConfig {
                id: "s1".into(),
                url: Url::parse("http://127.0.0.1:9002").unwrap(),
                weight: 1,
            },
        ];
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateBackendId(_)
        ));
    }

    #[test]
    fn colliding_ports_rejected() {
        let mut config = minimal_config();
        config.api_port = config.load_balancer_port;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue(_)
        ));
    }

    #[test]
    fn algorithm_round_trips_through_json_strings() {
        assert_eq!(LoadBalancingAlgorithm::parse("roundrobin"), Some(LoadBalancingAlgorithm::RoundRobin));
        assert_eq!(LoadBalancingAlgorithm::parse("weighted"), Some(LoadBalancingAlgorithm::Weighted));
        assert_eq!(LoadBalancingAlgorithm::parse("leastconnections"), Some(LoadBalancingAlgorithm::LeastConnections));
        assert_eq!(LoadBalancingAlgorithm::parse("iphash"), Some(LoadBalancingAlgorithm::IpHash));
        assert_eq!(LoadBalancingAlgorithm::parse("bogus"), None);
    }
}
