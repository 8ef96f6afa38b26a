// src/health/supervisor.rs
//
// Grounded on the inherited `health::checker::HealthChecker` (reqwest
// client, `tokio::time::interval` ticking, `tokio::sync::watch` shutdown,
// per-backend `tokio::spawn`); extended with a `Semaphore`-bounded worker
// pool (the teacher spawned one task per backend unboundedly — spec §4.3
// requires "a fixed-size worker pool of size P to cap outbound sockets")
// and the full 5-state transition policy via `Registry::set_health` instead
// of the teacher's binary healthy/unhealthy `Backend::update_health`.
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::registry::Registry;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

/// Caps concurrent outbound probe sockets (spec §4.3 "a fixed-size worker
/// pool of size P").
const MAX_CONCURRENT_PROBES: usize = 16;

pub struct HealthSupervisor {
    config: HealthCheckConfig,
    registry: Arc<Registry>,
    metrics: Arc<MetricsCollector>,
    client: Client,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    semaphore: Arc<Semaphore>,
}

impl HealthSupervisor {
    pub fn new(
        config: HealthCheckConfig,
        registry: Arc<Registry>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .expect("failed to build health-check HTTP client");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            registry,
            metrics,
            client,
            shutdown_tx,
            shutdown_rx,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_PROBES)),
        }
    }

    /// Runs the tick loop until `stop()` is called (spec §4.3 "Lifecycle").
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.config.interval());
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(interval = ?self.config.interval(), "health supervisor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("health supervisor stopping");
                        break;
                    }
                }
            }
        }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Obtains a snapshot of live backends and probes exactly that set
    /// (spec §4.3 "Registry coupling"): backends added after this point
    /// are picked up on the next tick, and a result for a backend removed
    /// mid-tick silently targets an id `Registry::set_health` will no
    /// longer find, discarding it per spec.
    async fn probe_all(&self) {
        let backends = self.registry.all_live();
        let total = backends.len();
        let mut handles = Vec::with_capacity(total);

        for backend in backends {
            let client = self.client.clone();
            let path = self.config.path.clone();
            let probe_timeout = self.config.timeout();
            let semaphore = self.semaphore.clone();
            let registry = self.registry.clone();
            let metrics = self.metrics.clone();
            let mut shutdown_rx = self.shutdown_rx.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                if *shutdown_rx.borrow() {
                    return;
                }

                let id = backend.id.clone();
                let url = backend.url().await;
                let target = match url.join(&path) {
                    Ok(u) => u,
                    Err(e) => {
                        warn!(backend = %id, error = %e, "invalid health-check path");
                        return;
                    }
                };

                let start = std::time::Instant::now();
                let probe = timeout(probe_timeout, client.get(target.as_str()).send());

                let (success, error): (bool, Option<String>) = tokio::select! {
                    result = probe => match result {
                        Ok(Ok(response)) => {
                            let status = response.status();
                            if status.as_u16() >= 200 && status.as_u16() < 400 {
                                (true, None)
                            } else {
                                (false, Some(format!("HTTP {status}")))
                            }
                        }
                        Ok(Err(e)) => (false, Some(e.to_string())),
                        Err(_) => (false, Some("probe timeout".to_string())),
                    },
                    _ = shutdown_rx.changed() => {
                        // Cancellation during an in-flight probe (spec
                        // §4.3/§5): discard the result entirely.
                        return;
                    }
                };

                let latency_ms = start.elapsed().as_millis() as u64;
                let was_eligible = backend.health_status().await.is_eligible();

                registry.set_health(&id, success, latency_ms).await;

                let is_eligible = backend.health_status().await.is_eligible();
                metrics.update_backend_health(&id, is_eligible);
                if was_eligible != is_eligible {
                    // Healthy<->Unhealthy crossing: notify (spec §4.3).
                    // Degraded<->Healthy stays silent (recorded via the
                    // state change itself, not a separate notification).
                    metrics.record_health_transition_notified(&id);
                    if is_eligible {
                        info!(backend = %id, "backend became eligible for traffic");
                    } else {
                        warn!(backend = %id, error = ?error, "backend no longer eligible for traffic");
                    }
                } else {
                    debug!(backend = %id, success, latency_ms, "probe completed");
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let healthy = self.registry.healthy().await.len();
        self.metrics.update_backend_counts(healthy, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthCheckConfig;
    use crate::registry::{BackendSpec, Registry};
    use url::Url;

    fn config_with_path(path: &str) -> HealthCheckConfig {
        HealthCheckConfig {
            interval_seconds: 1,
            timeout_seconds: 1,
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn probe_success_promotes_unknown_to_healthy() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let registry = Arc::new(Registry::new());
        registry
            .add(BackendSpec {
                id: "s1".into(),
                url: Url::parse(&server.url()).unwrap(),
                weight: 1,
            })
            .await
            .unwrap();

        let metrics = crate::metrics::MetricsRegistry::new().unwrap().collector();
        let supervisor = Arc::new(HealthSupervisor::new(config_with_path("/health"), registry.clone(), metrics));
        supervisor.probe_all().await;

        let snap = registry.get("s1").await.unwrap();
        assert_eq!(snap.health_status, crate::registry::HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn probe_failure_marks_unhealthy_after_threshold() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        let registry = Arc::new(Registry::new());
        registry
            .add(BackendSpec {
                id: "s1".into(),
                url: Url::parse(&server.url()).unwrap(),
                weight: 1,
            })
            .await
            .unwrap();
        registry.get_live("s1").unwrap().record_probe(true, 1).await;

        let metrics = crate::metrics::MetricsRegistry::new().unwrap().collector();
        let supervisor = Arc::new(HealthSupervisor::new(config_with_path("/health"), registry.clone(), metrics));
        supervisor.probe_all().await; // Healthy -> Degraded
        supervisor.probe_all().await; // Degraded -> Degraded
        supervisor.probe_all().await; // Degraded -> Unhealthy

        let snap = registry.get("s1").await.unwrap();
        assert_eq!(snap.health_status, crate::registry::HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn removed_backend_between_tick_and_completion_is_discarded() {
        let registry = Arc::new(Registry::new());
        // set_health on an unknown id must not panic and must be a no-op.
        registry.set_health("ghost", true, 5).await;
    }
}
