// src/metrics/rps.rs
//
// Sliding-window request-rate estimator (spec §4.5 "a sliding-window
// request-rate estimator"). No teacher precedent (the inherited collector
// only exposed Prometheus counters, which a scraper rate()s externally);
// the control-plane JSON snapshot (§4.6, §6 `/api/v1/metrics`) needs a
// number the process computes itself.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(10);

pub struct RpsEstimator {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RpsEstimator {
    pub fn new() -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self) {
        let mut timestamps = self.timestamps.lock().unwrap();
        timestamps.push_back(Instant::now());
        Self::evict_stale(&mut timestamps);
    }

    pub fn rate(&self) -> f64 {
        let mut timestamps = self.timestamps.lock().unwrap();
        Self::evict_stale(&mut timestamps);
        timestamps.len() as f64 / WINDOW.as_secs_f64()
    }

    fn evict_stale(timestamps: &mut VecDeque<Instant>) {
        let cutoff = Instant::now() - WINDOW;
        while let Some(front) = timestamps.front() {
            if *front < cutoff {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RpsEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_reflects_recent_requests() {
        let estimator = RpsEstimator::new();
        for _ in 0..5 {
            estimator.record();
        }
        assert!(estimator.rate() > 0.0);
    }

    #[test]
    fn empty_estimator_has_zero_rate() {
        let estimator = RpsEstimator::new();
        assert_eq!(estimator.rate(), 0.0);
    }
}
