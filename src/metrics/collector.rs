// src/metrics/collector.rs
//
// Grounded on the inherited `metrics::collector` module (Prometheus
// `Registry`/`IntCounterVec`/`HistogramVec` wiring kept nearly as-is); the
// circuit-breaker-state gauge is dropped (no counterpart — see
// DESIGN.md), and `activeRequests`, the RPS estimator, and a per-backend
// aggregate retirement map are added per spec §4.5/§4.6.
use super::rps::RpsEstimator;
use anyhow::Result;
use dashmap::DashMap;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        buffer
    }
}

#[derive(Default)]
struct BackendAggregate {
    requests: AtomicU64,
    errors: AtomicU64,
}

pub struct MetricsCollector {
    // Process-wide request metrics (spec §4.5).
    pub requests_total: IntCounter,
    pub errors_total: IntCounter,
    pub active_requests: IntGauge,
    pub request_duration_seconds: HistogramVec,

    // Selection/upstream failure counters (spec §7 taxonomy).
    pub selection_failures_total: IntCounter,
    pub upstream_unreachable_total: IntCounterVec,
    pub upstream_timeout_total: IntCounterVec,

    // Backend metrics.
    pub backend_requests_total: IntCounterVec,
    pub backend_connections_active: IntGaugeVec,
    pub backend_health_status: IntGaugeVec,
    pub health_transitions_total: IntCounterVec,

    // System metrics.
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,

    rps: RpsEstimator,
    per_backend: DashMap<String, BackendAggregate>,
}

#[derive(Debug, Serialize)]
pub struct BackendMetricsSnapshot {
    pub id: String,
    pub requests: u64,
    pub errors: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub active_requests: i64,
    pub requests_per_second: f64,
    pub healthy_backends: i64,
    pub total_backends: i64,
    pub backends: Vec<BackendMetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounter::new("lb_requests_total", "Total number of requests")?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = IntCounter::new("lb_errors_total", "Total number of request errors")?;
        registry.register(Box::new(errors_total.clone()))?;

        let active_requests = IntGauge::new("lb_active_requests", "In-flight requests")?;
        registry.register(Box::new(active_requests.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["status_code", "backend"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let selection_failures_total = IntCounter::new(
            "lb_selection_failures_total",
            "Requests rejected with no eligible backend",
        )?;
        registry.register(Box::new(selection_failures_total.clone()))?;

        let upstream_unreachable_total = IntCounterVec::new(
            Opts::new(
                "lb_upstream_unreachable_total",
                "Upstream connection failures",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(upstream_unreachable_total.clone()))?;

        let upstream_timeout_total = IntCounterVec::new(
            Opts::new("lb_upstream_timeout_total", "Upstream request timeouts"),
            &["backend"],
        )?;
        registry.register(Box::new(upstream_timeout_total.clone()))?;

        let backend_requests_total = IntCounterVec::new(
            Opts::new("lb_backend_requests_total", "Total backend requests"),
            &["backend", "status"],
        )?;
        registry.register(Box::new(backend_requests_total.clone()))?;

        let backend_connections_active = IntGaugeVec::new(
            Opts::new(
                "lb_backend_connections_active",
                "Active backend connections",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_connections_active.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=healthy/degraded, 0=otherwise)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let health_transitions_total = IntCounterVec::new(
            Opts::new(
                "lb_health_transitions_total",
                "Healthy<->Unhealthy crossings (spec: notified transitions only)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(health_transitions_total.clone()))?;

        let healthy_backends =
            IntGauge::new("lb_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            errors_total,
            active_requests,
            request_duration_seconds,
            selection_failures_total,
            upstream_unreachable_total,
            upstream_timeout_total,
            backend_requests_total,
            backend_connections_active,
            backend_health_status,
            health_transitions_total,
            healthy_backends,
            total_backends,
            rps: RpsEstimator::new(),
            per_backend: DashMap::new(),
        })
    }

    pub fn record_request(
        &self,
        status_code: u16,
        backend: &str,
        duration: Duration,
        success: bool,
    ) {
        self.requests_total.inc();
        self.rps.record();
        if !success {
            self.errors_total.inc();
        }

        let status = status_code.to_string();
        self.request_duration_seconds
            .with_label_values(&[&status, backend])
            .observe(duration.as_secs_f64());

        self.backend_requests_total
            .with_label_values(&[backend, if success { "success" } else { "failure" }])
            .inc();

        let aggregate = self.per_backend.entry(backend.to_string()).or_default();
        aggregate.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            aggregate.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_selection_failure(&self) {
        self.selection_failures_total.inc();
        self.errors_total.inc();
    }

    pub fn record_upstream_unreachable(&self, backend: &str) {
        self.upstream_unreachable_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_upstream_timeout(&self, backend: &str) {
        self.upstream_timeout_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_health_transition_notified(&self, backend: &str) {
        self.health_transitions_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn increment_active_requests(&self) {
        self.active_requests.inc();
    }

    pub fn decrement_active_requests(&self) {
        self.active_requests.dec();
    }

    pub fn update_backend_connections(&self, backend: &str, count: i64) {
        self.backend_connections_active
            .with_label_values(&[backend])
            .set(count);
    }

    pub fn update_backend_health(&self, backend: &str, eligible: bool) {
        self.backend_health_status
            .with_label_values(&[backend])
            .set(if eligible { 1 } else { 0 });
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }

    /// Drops a backend's aggregate on removal (spec §4.5: "Removal of a
    /// backend retires its aggregates").
    pub fn retire_backend(&self, backend: &str) {
        self.per_backend.remove(backend);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let backends = self
            .per_backend
            .iter()
            .map(|entry| BackendMetricsSnapshot {
                id: entry.key().clone(),
                requests: entry.value().requests.load(Ordering::Relaxed),
                errors: entry.value().errors.load(Ordering::Relaxed),
            })
            .collect();

        MetricsSnapshot {
            total_requests: self.requests_total.get(),
            total_errors: self.errors_total.get(),
            active_requests: self.active_requests.get(),
            requests_per_second: self.rps.rate(),
            healthy_backends: self.healthy_backends.get(),
            total_backends: self.total_backends.get(),
            backends,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_request_and_retires_backend() {
        let registry = Registry::new();
        let collector = MetricsCollector::new(&registry).unwrap();
        collector.record_request(200, "s1", Duration::from_millis(10), true);
        collector.record_request(502, "s1", Duration::from_millis(5), false);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.backends.len(), 1);
        assert_eq!(snapshot.backends[0].requests, 2);
        assert_eq!(snapshot.backends[0].errors, 1);

        collector.retire_backend("s1");
        assert_eq!(collector.snapshot().backends.len(), 0);
    }

    #[test]
    fn selection_failure_counts_as_error_without_a_backend() {
        let registry = Registry::new();
        let collector = MetricsCollector::new(&registry).unwrap();
        collector.record_selection_failure();
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.total_requests, 0);
    }
}
