mod common;

use common::*;
use netaudit::{
    AddressRange, AuditReport, CollectionCoordinator, CollectionPlan, CoordinatorOptions, ErrorKind, Host, HostScanner,
    HostStatus, InventoryCollector, Reachability,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn reachable(hosts: &[u8]) -> Vec<Host> {
    hosts
        .iter()
        .map(|&n| Host::new(addr(n)).classified(Reachability::Reachable))
        .collect()
}

async fn run(transport: SimulatedTransport, hosts: &[u8], plan: CollectionPlan, parallelism: usize) -> AuditReport {
    CollectionCoordinator::new(
        Arc::new(transport),
        credentials(),
        InventoryCollector::new(plan),
        CoordinatorOptions::default().with_parallelism(parallelism),
    )
    .run(&reachable(hosts))
    .await
}

#[tokio::test]
async fn test_auth_failure_is_isolated() {
    let transport = SimulatedTransport::new([
        (addr(1), HostScript::healthy("CORP\\alice")),
        (addr(2), HostScript::rejecting()),
        (addr(3), HostScript::healthy("CORP\\bob")),
    ]);
    let closed = transport.closed.clone();

    let report = run(transport, &[1, 2, 3], CollectionPlan::default(), 4).await;

    let failed = report.outcome(addr(2)).unwrap();
    assert_eq!(failed.status, HostStatus::Failed);
    assert_eq!(failed.failures[0].kind, ErrorKind::Authentication);

    assert!(report.software.iter().all(|r| r.host != addr(2)));
    assert!(report.devices.iter().all(|r| r.host != addr(2)));
    assert!(report.events.iter().all(|r| r.host != addr(2)));

    assert_eq!(report.outcome(addr(1)).unwrap().status, HostStatus::Success);
    assert_eq!(report.outcome(addr(3)).unwrap().status, HostStatus::Success);
    assert_eq!(report.software.len(), 6);
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_device_failure_is_partial() {
    let mut script = HostScript::healthy("CORP\\carol");
    script.devices = Reply::Exit(1, "Get-PnpDevice : The term 'Get-PnpDevice' is not recognized".into());
    let transport = SimulatedTransport::new([(addr(5), script)]);

    let report = run(transport, &[5], CollectionPlan::default(), 1).await;

    let outcome = report.outcome(addr(5)).unwrap();
    assert_eq!(outcome.status, HostStatus::PartialFailure);
    assert!(outcome.detail().unwrap().starts_with("devices: "));
    assert_eq!(report.software.len(), 3);
    assert!(report.devices.is_empty());
    assert_eq!(report.events.len(), 2);
    assert!(report.software.iter().all(|r| r.user == "CORP\\carol"));
}

#[tokio::test]
async fn test_undecodable_software_keeps_devices_and_events() {
    let mut script = HostScript::healthy("CORP\\heidi");
    script.software = Reply::Garbled("malformed Receive response".into());
    let transport = SimulatedTransport::new([(addr(10), script)]);
    let opened = transport.opened.clone();
    let closed = transport.closed.clone();

    let report = run(transport, &[10], CollectionPlan::default(), 1).await;

    let outcome = report.outcome(addr(10)).unwrap();
    assert_eq!(outcome.status, HostStatus::PartialFailure);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].kind, ErrorKind::Protocol);
    assert!(report.software.is_empty());
    assert_eq!(report.devices.len(), 2);
    assert_eq!(report.events.len(), 2);
    assert!(report.devices.iter().all(|r| r.user == "CORP\\heidi"));

    // The failed session is replaced, and both are released
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_event_window_bounds_records() {
    let mut script = HostScript::healthy("CORP\\dave");
    script.events = Reply::lines(&[
        "2026-10-14T08:00:05Z\t2003\tfifth",
        "2026-10-14T08:00:04Z\t2100\tfourth",
        "2026-10-14T08:00:03Z\t2003\tthird",
        "2026-10-14T08:00:02Z\t2100\tsecond",
        "2026-10-14T08:00:01Z\t2003\tfirst",
    ]);
    let transport = SimulatedTransport::new([(addr(6), script)]);

    let report = run(transport, &[6], CollectionPlan::default().with_event_window(2), 1).await;

    assert!(report.events.len() <= 2);
    assert_eq!(
        report.events.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
        vec!["fifth", "fourth"]
    );
}

#[tokio::test]
async fn test_identity_failure_emits_no_records() {
    let mut script = HostScript::healthy("unused");
    script.identity = Reply::Fault("whoami: access denied".into());
    let transport = SimulatedTransport::new([(addr(7), script)]);

    let report = run(transport, &[7], CollectionPlan::default(), 1).await;

    assert_eq!(report.outcome(addr(7)).unwrap().status, HostStatus::Failed);
    assert_eq!(report.record_count(), 0);
}

#[tokio::test]
async fn test_malformed_event_lines_are_kept() {
    let mut script = HostScript::healthy("CORP\\erin");
    script.events = Reply::lines(&["TimeCreated Id Message", "-----------", "2026-10-14T08:00:05Z\t2003\tok"]);
    let transport = SimulatedTransport::new([(addr(8), script)]);

    let report = run(transport, &[8], CollectionPlan::default(), 1).await;

    assert_eq!(report.events.len(), 3);
    assert_eq!(report.events[0].event_id, None);
    assert_eq!(report.events[0].message, "TimeCreated Id Message");
    assert_eq!(report.events[2].event_id, Some(2003));
}

#[tokio::test]
async fn test_reruns_produce_equal_collections() {
    let scripts = || {
        (1..=12u8).map(|n| {
            let script = if n % 5 == 0 {
                HostScript::rejecting()
            } else {
                HostScript::healthy(&format!("CORP\\user{}", n))
            };
            (addr(n), script)
        })
    };
    let hosts: Vec<u8> = (1..=12).collect();

    let mut first = run(SimulatedTransport::new(scripts()), &hosts, CollectionPlan::default(), 4).await;
    let mut second = run(SimulatedTransport::new(scripts()), &hosts, CollectionPlan::default(), 1).await;
    first.normalize();
    second.normalize();

    assert_eq!(first, second);
    assert_eq!(first.summary().failed, 2);
}

#[tokio::test]
async fn test_scan_then_collect_end_to_end() {
    let range: AddressRange = "10.20.0.0/28".parse().unwrap();
    let probe = SimulatedProbe::new(&[addr(3), addr(9)]);
    let hosts = HostScanner::with_parallelism(probe, 4).scan(&range).await;
    assert_eq!(hosts.len(), 2);

    let transport = SimulatedTransport::new([
        (addr(3), HostScript::healthy("CORP\\frank")),
        (addr(9), HostScript::healthy("CORP\\grace")),
    ]);
    let report = CollectionCoordinator::new(
        Arc::new(transport),
        credentials(),
        InventoryCollector::default(),
        CoordinatorOptions::default(),
    )
    .run(&hosts)
    .await;

    let summary = report.summary();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.total_records(), 14);
}
