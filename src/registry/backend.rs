// src/registry/backend.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use url::Url;

/// Per-backend health state machine (spec §3).
///
/// Transitions are driven exclusively by [`Backend::record_probe`]; the data
/// plane never mutates this field directly (§7: "upstream errors ...
/// contribute to health state only via the supervisor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
    Maintenance,
}

impl HealthStatus {
    pub fn is_eligible(self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// An immutable, point-in-time copy of a [`Backend`]'s scalar fields.
///
/// Strategies and the proxy engine only ever see this type; the live
/// `Backend` stays behind the registry (spec §9: "external observers
/// receive immutable snapshots ... and must never mutate").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSnapshot {
    pub id: String,
    pub url: Url,
    pub weight: u32,
    pub health_status: HealthStatus,
    pub active_connections: usize,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub consecutive_failures: usize,
    pub consecutive_successes: usize,
}

/// The live, registry-owned backend entity (spec §3 "Backend").
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    url: RwLock<Url>,
    weight: AtomicU64,
    health_status: RwLock<HealthStatus>,
    active_connections: AtomicUsize,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
    last_response_time_ms: AtomicI64,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

/// Response latency above this threshold demotes a Healthy backend to
/// Degraded on an otherwise-successful probe (spec §3).
pub const LATENCY_WARNING_THRESHOLD_MS: u64 = 500;

impl Backend {
    pub fn new(id: String, url: Url, weight: u32) -> Self {
        Self {
            id,
            url: RwLock::new(url),
            weight: AtomicU64::new(weight as u64),
            health_status: RwLock::new(HealthStatus::Unknown),
            active_connections: AtomicUsize::new(0),
            last_health_check: RwLock::new(None),
            last_response_time_ms: AtomicI64::new(-1),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    pub async fn snapshot(&self) -> BackendSnapshot {
        let last_response_time_ms = match self.last_response_time_ms.load(Ordering::Relaxed) {
            v if v < 0 => None,
            v => Some(v as u64),
        };
        BackendSnapshot {
            id: self.id.clone(),
            url: self.url.read().await.clone(),
            weight: self.weight.load(Ordering::Relaxed) as u32,
            health_status: *self.health_status.read().await,
            active_connections: self.active_connections.load(Ordering::Relaxed),
            last_health_check: *self.last_health_check.read().await,
            last_response_time_ms,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            consecutive_successes: self.consecutive_successes.load(Ordering::Relaxed),
        }
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed) as u32
    }

    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight as u64, Ordering::Relaxed);
    }

    pub async fn url(&self) -> Url {
        self.url.read().await.clone()
    }

    /// Updates the URL and resets health to Unknown with cleared counters
    /// (spec §4.1: "Updating the URL resets healthStatus to Unknown and
    /// clears consecutive counters").
    pub async fn set_url(&self, url: Url) {
        *self.url.write().await = url;
        *self.health_status.write().await = HealthStatus::Unknown;
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        *self.last_health_check.write().await = None;
        self.last_response_time_ms.store(-1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Increments the in-flight counter. Pairs with exactly one
    /// [`Backend::decrement_connections`] call per invariant 2.
    pub fn increment_connections(&self) -> usize {
        self.active_connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrement_connections(&self) {
        let prev = self.active_connections.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "activeConnections underflow on backend");
    }

    pub async fn health_status(&self) -> HealthStatus {
        *self.health_status.read().await
    }

    /// Forces `Maintenance` state (operator action via the registry).
    /// Sticky: probes keep running (§4.3) but never transition out of it
    /// except through another explicit `set_maintenance` call.
    pub async fn set_maintenance(&self, on: bool) {
        let mut status = self.health_status.write().await;
        *status = if on {
            HealthStatus::Maintenance
        } else {
            HealthStatus::Unknown
        };
    }

    /// Drives the health state machine from one completed probe outcome
    /// (spec §3 "Health transition policy"). Never called from the data
    /// plane — only the supervisor calls this (§4.3, §9).
    pub async fn record_probe(&self, success: bool, latency_ms: u64) {
        *self.last_health_check.write().await = Some(Utc::now());
        self.last_response_time_ms
            .store(latency_ms as i64, Ordering::Relaxed);

        let mut status = self.health_status.write().await;
        if *status == HealthStatus::Maintenance {
            // Sticky: probes run, but Maintenance is left only by the
            // registry's explicit operator action.
            return;
        }

        if success {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;

            *status = match *status {
                HealthStatus::Unknown => HealthStatus::Healthy,
                HealthStatus::Unhealthy => {
                    if successes >= 2 {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Unhealthy
                    }
                }
                HealthStatus::Degraded => {
                    if latency_ms > LATENCY_WARNING_THRESHOLD_MS {
                        HealthStatus::Degraded
                    } else {
                        HealthStatus::Healthy
                    }
                }
                HealthStatus::Healthy => {
                    if latency_ms > LATENCY_WARNING_THRESHOLD_MS {
                        HealthStatus::Degraded
                    } else {
                        HealthStatus::Healthy
                    }
                }
                HealthStatus::Maintenance => unreachable!(),
            };
        } else {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

            *status = match *status {
                HealthStatus::Healthy => HealthStatus::Degraded,
                HealthStatus::Degraded => {
                    // Degraded -> Unhealthy after two additional consecutive
                    // failures (three total, counting the one that caused
                    // Healthy -> Degraded).
                    if failures >= 3 {
                        HealthStatus::Unhealthy
                    } else {
                        HealthStatus::Degraded
                    }
                }
                HealthStatus::Unknown | HealthStatus::Unhealthy => HealthStatus::Unhealthy,
                HealthStatus::Maintenance => unreachable!(),
            };
        }
    }
}
