// src/strategy/round_robin.rs
//
// Grounded directly on the inherited `load_balancer::round_robin` module;
// kept nearly verbatim, made synchronous per the strategy redesign (§9).
use crate::registry::BackendSnapshot;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RoundRobinState {
    cursor: AtomicUsize,
}

impl RoundRobinState {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

pub fn select<'a>(
    state: &RoundRobinState,
    snapshot: &'a [BackendSnapshot],
) -> Option<&'a BackendSnapshot> {
    if snapshot.is_empty() {
        return None;
    }
    let index = state.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
    Some(&snapshot[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::snap;

    #[test]
    fn fair_over_equal_weight_backends() {
        let state = RoundRobinState::new();
        let snapshot = vec![snap("s1", 1, 0), snap("s2", 1, 0)];
        let mut counts = std::collections::HashMap::new();
        for _ in 0..6 {
            let chosen = select(&state, &snapshot).unwrap();
            *counts.entry(chosen.id.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts["s1"], 3);
        assert_eq!(counts["s2"], 3);
    }

    #[test]
    fn k_backends_m_rounds_yields_exactly_m_per_backend() {
        let state = RoundRobinState::new();
        let snapshot: Vec<_> = (0..5).map(|i| snap(&format!("s{i}"), 1, 0)).collect();
        let m = 7;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..(snapshot.len() * m) {
            let chosen = select(&state, &snapshot).unwrap();
            *counts.entry(chosen.id.clone()).or_insert(0) += 1;
        }
        for snap in &snapshot {
            assert_eq!(counts[&snap.id], m);
        }
    }
}
