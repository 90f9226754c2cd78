//! Subnet selection invariants.

#![allow(clippy::expect_used)]

use devkit_cli::domain::network::{candidate_subnets, overlaps_any, pick_free_subnet, Subnet};
use proptest::prelude::*;

#[test]
fn conflict_moves_to_next_candidate() {
    let used = vec!["172.30.10.0/24".to_string()];
    let picked = pick_free_subnet(None, &used, &[]).expect("a free subnet");
    assert_eq!(picked.to_string(), "172.30.20.0/24");
    assert_eq!(picked.dns_host().to_string(), "172.30.20.53");
}

#[test]
fn never_returns_a_used_subnet() {
    let used = vec![
        "172.30.10.0/24".to_string(),
        "172.30.20.0/24".to_string(),
        "10.10.0.0/24".to_string(),
    ];
    let picked = pick_free_subnet(None, &used, &[]).expect("a free subnet");
    assert!(!overlaps_any(&picked, &used));
}

#[test]
fn dns_host_is_inside_the_subnet_and_not_network_or_broadcast() {
    for candidate in candidate_subnets(None) {
        let dns = candidate.dns_host();
        assert!(candidate.contains(dns), "{candidate} does not contain {dns}");
        let last = dns.octets()[3];
        assert_ne!(last, 0, "{candidate} picked the network address");
        assert_ne!(last, 255, "{candidate} picked the broadcast address");
    }
}

#[test]
fn exhaustion_is_an_error() {
    let used = vec!["0.0.0.0/0".to_string()];
    let err = pick_free_subnet(None, &used, &[]).expect_err("everything overlaps");
    assert!(err.to_string().contains("no free internal subnet"));
}

#[test]
fn preferred_cidr_is_tried_first() {
    let preferred: Subnet = "10.99.0.0/24".parse().expect("valid cidr");
    let picked = pick_free_subnet(Some(preferred), &[], &[]).expect("free");
    assert_eq!(picked, preferred);

    // A used preferred subnet falls through to the normal ordering.
    let used = vec!["10.99.0.0/24".to_string()];
    let picked = pick_free_subnet(Some(preferred), &used, &[]).expect("free");
    assert_eq!(picked.to_string(), "172.30.10.0/24");
}

#[test]
fn unparseable_used_entries_are_ignored() {
    let used = vec![
        "default".to_string(),
        "fe80::/64".to_string(),
        "not-a-cidr".to_string(),
    ];
    let picked = pick_free_subnet(None, &used, &[]).expect("free");
    assert_eq!(picked.to_string(), "172.30.10.0/24");
}

proptest! {
    /// Overlap is symmetric for any pair of candidate subnets.
    #[test]
    fn prop_overlap_symmetry(a in 0usize..64, b in 0usize..64) {
        let candidates = candidate_subnets(None);
        let x = candidates[a % candidates.len()];
        let y = candidates[b % candidates.len()];
        prop_assert_eq!(x.overlaps(&y), y.overlaps(&x));
    }

    /// A /24 always contains its own DNS host.
    #[test]
    fn prop_dns_in_own_subnet(second in 0u8..=255, third in 0u8..=255) {
        let cidr = format!("10.{second}.{third}.0/24");
        let subnet: Subnet = cidr.parse().expect("valid cidr");
        prop_assert!(subnet.contains(subnet.dns_host()));
    }
}
