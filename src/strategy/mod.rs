// src/strategy/mod.rs
mod ip_hash;
mod least_connections;
mod round_robin;
mod weighted;

use crate::config::LoadBalancingAlgorithm;
use crate::registry::BackendSnapshot;
use round_robin::RoundRobinState;
use weighted::WeightedState;

/// Tagged variant over the four selection algorithms (spec §9 "Strategy
/// polymorphism": "represent as a tagged variant over the four
/// implementations rather than an open extension mechanism"), not a trait
/// object. Selection is synchronous (§4.2, §5: "selection ... non-suspending").
pub enum Strategy {
    RoundRobin(RoundRobinState),
    Weighted(WeightedState),
    LeastConnections,
    IpHash,
}

impl Strategy {
    pub fn new(algorithm: LoadBalancingAlgorithm) -> Self {
        match algorithm {
            LoadBalancingAlgorithm::RoundRobin => Strategy::RoundRobin(RoundRobinState::new()),
            LoadBalancingAlgorithm::Weighted => Strategy::Weighted(WeightedState::new()),
            LoadBalancingAlgorithm::LeastConnections => Strategy::LeastConnections,
            LoadBalancingAlgorithm::IpHash => Strategy::IpHash,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::RoundRobin(_) => "roundrobin",
            Strategy::Weighted(_) => "weighted",
            Strategy::LeastConnections => "leastconnections",
            Strategy::IpHash => "iphash",
        }
    }

    /// Shared selection contract (spec §4.2): `clientKey` is ignored by
    /// every strategy except IP-hash; `snapshot` must already be the
    /// pre-filtered healthy set (`Registry::healthy`) — strategies never
    /// re-check health themselves.
    pub fn select<'a>(
        &self,
        client_key: &str,
        snapshot: &'a [BackendSnapshot],
    ) -> Option<&'a BackendSnapshot> {
        if snapshot.is_empty() || snapshot.iter().all(|b| b.weight == 0) {
            return None;
        }
        match self {
            Strategy::RoundRobin(state) => round_robin::select(state, snapshot),
            Strategy::Weighted(state) => weighted::select(state, snapshot),
            Strategy::LeastConnections => least_connections::select(snapshot),
            Strategy::IpHash => ip_hash::select(client_key, snapshot),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::registry::HealthStatus;
    use url::Url;

    pub(crate) fn snap(id: &str, weight: u32, active: usize) -> BackendSnapshot {
        BackendSnapshot {
            id: id.to_string(),
            url: Url::parse("http://127.0.0.1:9000").unwrap(),
            weight,
            health_status: HealthStatus::Healthy,
            active_connections: active,
            last_health_check: None,
            last_response_time_ms: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::snap;
    use super::*;

    #[test]
    fn empty_snapshot_is_none_eligible() {
        let s = Strategy::new(LoadBalancingAlgorithm::RoundRobin);
        assert!(s.select("1.2.3.4", &[]).is_none());
    }

    #[test]
    fn all_zero_weight_is_none_eligible() {
        let s = Strategy::new(LoadBalancingAlgorithm::RoundRobin);
        let snapshot = vec![snap("s1", 0, 0), snap("s2", 0, 0)];
        assert!(s.select("1.2.3.4", &snapshot).is_none());
    }
}
