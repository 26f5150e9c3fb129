mod common;

use common::*;
use netaudit::{AddressRange, AuditConfig, AuditError, HostScanner};
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

#[test]
fn test_malformed_cidrs_are_config_errors() {
    for input in ["10.0.0.0/99", "not-an-ip/24", "10.0.0/24", "10.0.0.0", "10.0.0.0/", "10.0.0.256/24", "10.0.0.0/-1"] {
        let result = input.parse::<AddressRange>();
        assert!(
            matches!(result, Err(AuditError::ConfigError(_))),
            "{} should be rejected",
            input
        );
    }
}

#[test]
fn test_config_validation_rejects_bad_target() {
    let config = AuditConfig::new("not-an-ip/24".to_string());
    let err = config.validate().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_network_and_broadcast_are_included() {
    let range: AddressRange = "192.168.7.9/30".parse().unwrap();
    let addresses: Vec<Ipv4Addr> = range.iter().collect();
    assert_eq!(
        addresses,
        vec![
            Ipv4Addr::new(192, 168, 7, 8),
            Ipv4Addr::new(192, 168, 7, 9),
            Ipv4Addr::new(192, 168, 7, 10),
            Ipv4Addr::new(192, 168, 7, 11),
        ]
    );
}

async fn scan_with(parallelism: usize) -> HashSet<Ipv4Addr> {
    let range: AddressRange = "10.20.0.0/24".parse().unwrap();
    let probe = SimulatedProbe::new(&[addr(17), addr(200)]);
    HostScanner::with_parallelism(probe, parallelism)
        .scan(&range)
        .await
        .into_iter()
        .map(|host| {
            assert!(host.is_reachable());
            host.address
        })
        .collect()
}

#[tokio::test]
async fn test_scan_result_independent_of_parallelism() {
    let expected: HashSet<Ipv4Addr> = [addr(17), addr(200)].into_iter().collect();
    assert_eq!(scan_with(1).await, expected);
    assert_eq!(scan_with(4).await, expected);
    assert_eq!(scan_with(usize::MAX).await, expected);
}

#[tokio::test]
async fn test_every_address_is_probed_once() {
    let range: AddressRange = "10.20.0.0/26".parse().unwrap();
    let probe = std::sync::Arc::new(SimulatedProbe::new(&[]));
    let scanner = HostScanner::with_parallelism(ArcProbe(probe.clone()), 8);
    assert!(scanner.scan(&range).await.is_empty());
    assert_eq!(probe.probes.load(Ordering::SeqCst), 64);
}

struct ArcProbe(std::sync::Arc<SimulatedProbe>);

#[async_trait::async_trait]
impl netaudit::LivenessProbe for ArcProbe {
    async fn probe(&self, address: Ipv4Addr) -> netaudit::Reachability {
        self.0.probe(address).await
    }

    fn method_name(&self) -> &str {
        self.0.method_name()
    }
}

proptest! {
    #[test]
    fn prop_enumeration_is_exact_ascending_and_contained(raw in any::<u32>(), prefix in 20u8..=32) {
        let range = AddressRange::new(Ipv4Addr::from(raw), prefix).unwrap();
        let addresses: Vec<u32> = range.iter().map(u32::from).collect();

        prop_assert_eq!(addresses.len() as u64, 1u64 << (32 - prefix));
        prop_assert!(addresses.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(range.iter().all(|a| range.contains(a)));

        // Restartable
        prop_assert_eq!(range.iter().count(), addresses.len());
    }
}
