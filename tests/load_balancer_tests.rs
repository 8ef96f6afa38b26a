// tests/load_balancer_tests.rs
//
// Integration suite over the in-process `Registry`/`Strategy`/`Backend`
// types: fairness laws, health-driven exclusion, and registry version
// monotonicity. Real listeners are out of scope for a deterministic run;
// HTTP-facing behavior is covered by the `#[cfg(test)]` modules in
// `src/proxy/` and `src/api/` instead.
use balance_plane::config::LoadBalancingAlgorithm;
use balance_plane::registry::{BackendPatch, BackendSpec, Registry};
use balance_plane::strategy::Strategy;
use std::collections::HashMap;
use url::Url;

fn backend_url(port: u16) -> Url {
    Url::parse(&format!("http://127.0.0.1:{port}")).unwrap()
}

async fn registry_with(ids_and_weights: &[(&str, u32)]) -> Registry {
    let registry = Registry::new();
    for (port, (id, weight)) in (9100..).zip(ids_and_weights.iter()) {
        registry
            .add(BackendSpec {
                id: id.to_string(),
                url: backend_url(port),
                weight: *weight,
            })
            .await
            .unwrap();
        let live = registry.get_live(id).unwrap();
        live.record_probe(true, 5).await;
    }
    registry
}

#[tokio::test]
async fn round_robin_is_fair_over_many_rounds() {
    let registry = registry_with(&[("s1", 1), ("s2", 1), ("s3", 1)]).await;
    let strategy = Strategy::new(LoadBalancingAlgorithm::RoundRobin);

    let rounds = 9;
    let mut counts: HashMap<String, u32> = HashMap::new();
    for _ in 0..(rounds * 3) {
        let healthy = registry.healthy().await;
        let chosen = strategy.select("irrelevant", &healthy).unwrap();
        *counts.entry(chosen.id.clone()).or_insert(0) += 1;
    }
    assert_eq!(counts["s1"], rounds);
    assert_eq!(counts["s2"], rounds);
    assert_eq!(counts["s3"], rounds);
}

#[tokio::test]
async fn weighted_round_robin_distributes_proportionally_and_bounds_runs() {
    let registry = registry_with(&[("heavy", 5), ("light", 2)]).await;
    let strategy = Strategy::new(LoadBalancingAlgorithm::Weighted);

    let total = 7 * 10;
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut run = 0usize;
    let mut last: Option<String> = None;
    let max_allowed_run = 3; // ceil(5/2)

    for _ in 0..total {
        let healthy = registry.healthy().await;
        let chosen = strategy.select("irrelevant", &healthy).unwrap();
        *counts.entry(chosen.id.clone()).or_insert(0) += 1;
        if last.as_deref() == Some(chosen.id.as_str()) {
            run += 1;
        } else {
            run = 1;
            last = Some(chosen.id.clone());
        }
        assert!(run <= max_allowed_run, "same backend selected too many times in a row");
    }
    assert_eq!(counts["heavy"], (total / 7 * 5) as u32);
    assert_eq!(counts["light"], (total / 7 * 2) as u32);
}

#[tokio::test]
async fn unhealthy_backend_is_never_selected_by_any_strategy() {
    let registry = registry_with(&[("good", 1), ("bad", 1)]).await;
    let bad = registry.get_live("bad").unwrap();
    for _ in 0..3 {
        bad.record_probe(false, 5).await;
    }

    for algorithm in [
        LoadBalancingAlgorithm::RoundRobin,
        LoadBalancingAlgorithm::Weighted,
        LoadBalancingAlgorithm::LeastConnections,
        LoadBalancingAlgorithm::IpHash,
    ] {
        let strategy = Strategy::new(algorithm);
        for _ in 0..10 {
            let healthy = registry.healthy().await;
            let chosen = strategy.select("10.0.0.7", &healthy).unwrap();
            assert_eq!(chosen.id, "good");
        }
    }
}

#[tokio::test]
async fn least_connections_prefers_the_backend_with_fewer_in_flight() {
    let registry = registry_with(&[("s1", 1), ("s2", 1)]).await;
    let s1 = registry.get_live("s1").unwrap();
    s1.increment_connections();
    s1.increment_connections();

    let strategy = Strategy::new(LoadBalancingAlgorithm::LeastConnections);
    let healthy = registry.healthy().await;
    let chosen = strategy.select("irrelevant", &healthy).unwrap();
    assert_eq!(chosen.id, "s2");
}

#[tokio::test]
async fn ip_hash_sticks_each_client_to_one_backend_across_registry_mutations_elsewhere() {
    let registry = registry_with(&[("s1", 1), ("s2", 1), ("s3", 1), ("s4", 1)]).await;
    let strategy = Strategy::new(LoadBalancingAlgorithm::IpHash);

    let healthy = registry.healthy().await;
    let first = strategy.select("203.0.113.9", &healthy).unwrap().id.clone();
    for _ in 0..20 {
        let healthy = registry.healthy().await;
        let chosen = strategy.select("203.0.113.9", &healthy).unwrap();
        assert_eq!(chosen.id, first);
    }
}

#[tokio::test]
async fn registry_version_is_strictly_monotonic_across_mutations() {
    let registry = Registry::new();
    let v0 = registry.version();

    registry
        .add(BackendSpec {
            id: "s1".to_string(),
            url: backend_url(9200),
            weight: 1,
        })
        .await
        .unwrap();
    let v1 = registry.version();
    assert!(v1 > v0);

    registry
        .update(
            "s1",
            BackendPatch {
                url: None,
                weight: Some(3),
            },
        )
        .await
        .unwrap();
    let v2 = registry.version();
    assert!(v2 > v1);

    registry.remove("s1").await.unwrap();
    let v3 = registry.version();
    assert!(v3 > v2);
}

#[tokio::test]
async fn healthy_snapshot_excludes_zero_weight_and_unhealthy_backends() {
    let registry = registry_with(&[("keep", 1), ("zero", 1)]).await;
    registry.get_live("zero").unwrap().set_weight(0);

    registry
        .add(BackendSpec {
            id: "fresh".to_string(),
            url: backend_url(9300),
            weight: 1,
        })
        .await
        .unwrap();
    // "fresh" never had a probe recorded, so it stays Unknown and ineligible.

    let healthy = registry.healthy().await;
    let ids: Vec<_> = healthy.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["keep"]);
}
