// src/strategy/ip_hash.rs
//
// FNV-1a over the client key (spec §4.2). Three lines of arithmetic; not
// worth a crate dependency, and no teacher/example precedent to ground it
// on beyond the spec's own algorithm statement.
use crate::registry::BackendSnapshot;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

pub fn select<'a>(client_key: &str, snapshot: &'a [BackendSnapshot]) -> Option<&'a BackendSnapshot> {
    if snapshot.is_empty() {
        return None;
    }
    let index = (fnv1a(client_key) as usize) % snapshot.len();
    Some(&snapshot[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::snap;

    #[test]
    fn pure_function_of_client_key_for_fixed_snapshot() {
        let snapshot = vec![snap("s1", 1, 0), snap("s2", 1, 0), snap("s3", 1, 0)];
        let a = select("10.0.0.1", &snapshot).unwrap().id.clone();
        let b = select("10.0.0.1", &snapshot).unwrap().id.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_clients_stick_to_possibly_different_backends() {
        let snapshot: Vec<_> = (0..4).map(|i| snap(&format!("s{i}"), 1, 0)).collect();
        let client_a_backend = select("client-a", &snapshot).unwrap().id.clone();
        for _ in 0..20 {
            assert_eq!(select("client-a", &snapshot).unwrap().id, client_a_backend);
        }
        let client_b_backend = select("client-b", &snapshot).unwrap().id.clone();
        for _ in 0..20 {
            assert_eq!(select("client-b", &snapshot).unwrap().id, client_b_backend);
        }
    }
}
