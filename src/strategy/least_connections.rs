// src/strategy/least_connections.rs
//
// Loosely grounded on the scan-for-extremum-over-a-live-counter shape in
// other_examples' least_response_load_balancer.rs, adapted from a
// response-time min-heap to a linear scan over `activeConnections` (spec
// §4.2): a cached heap ordering would go stale on every request since the
// counter changes out from under it.
use crate::registry::BackendSnapshot;

/// Compares `a.active_connections / max(a.weight, 1)` against
/// `b.active_connections / max(b.weight, 1)` via cross-multiplication to
/// avoid floating point (spec §4.2).
fn less_loaded(a: &BackendSnapshot, b: &BackendSnapshot) -> std::cmp::Ordering {
    let aw = a.weight.max(1) as u64;
    let bw = b.weight.max(1) as u64;
    let lhs = a.active_connections as u64 * bw;
    let rhs = b.active_connections as u64 * aw;
    lhs.cmp(&rhs).then_with(|| a.id.cmp(&b.id))
}

pub fn select(snapshot: &[BackendSnapshot]) -> Option<&BackendSnapshot> {
    snapshot
        .iter()
        .min_by(|a, b| less_loaded(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::snap;

    #[test]
    fn picks_smallest_active_connections() {
        let snapshot = vec![snap("s1", 1, 5), snap("s2", 1, 2), snap("s3", 1, 8)];
        let chosen = select(&snapshot).unwrap();
        assert_eq!(chosen.id, "s2");
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let snapshot = vec![snap("zeta", 1, 2), snap("alpha", 1, 2)];
        let chosen = select(&snapshot).unwrap();
        assert_eq!(chosen.id, "alpha");
    }

    #[test]
    fn weight_breaks_ties_via_ratio() {
        // s1: 4 active / weight 2 = ratio 2; s2: 3 active / weight 1 = ratio 3.
        // s1 is less loaded relative to its weight.
        let snapshot = vec![snap("s1", 2, 4), snap("s2", 1, 3)];
        let chosen = select(&snapshot).unwrap();
        assert_eq!(chosen.id, "s1");
    }
}
