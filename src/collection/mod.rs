//! Fan-out of per-host collection and the merged run report

pub mod coordinator;

use crate::error::ErrorKind;
use crate::inventory::{DeviceRecord, EventRecord, HostInventory, HostOutcome, HostStatus, SoftwareRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

pub use coordinator::{CollectionCoordinator, CoordinatorOptions};

/// Aggregate of every host's records plus one outcome per attempted host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub software: Vec<SoftwareRecord>,
    pub devices: Vec<DeviceRecord>,
    pub events: Vec<EventRecord>,
    pub outcomes: Vec<HostOutcome>,
    /// Reachable hosts never launched because the run was cancelled
    pub skipped: Vec<Ipv4Addr>,
}

impl AuditReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished host into the aggregate
    pub fn merge(&mut self, inventory: HostInventory) {
        self.outcomes.push(inventory.outcome());
        self.software.extend(inventory.software);
        self.devices.extend(inventory.devices);
        self.events.extend(inventory.events);
    }

    pub fn mark_skipped(&mut self, host: Ipv4Addr) {
        self.skipped.push(host);
    }

    pub fn record_count(&self) -> usize {
        self.software.len() + self.devices.len() + self.events.len()
    }

    pub fn outcome(&self, host: Ipv4Addr) -> Option<&HostOutcome> {
        self.outcomes.iter().find(|outcome| outcome.host == host)
    }

    /// Sort records and outcomes by host so reruns compare equal
    pub fn normalize(&mut self) {
        self.software.sort();
        self.devices.sort();
        self.events.sort();
        self.outcomes.sort_by_key(|outcome| outcome.host);
        self.skipped.sort();
    }

    pub fn summary(&self) -> RunSummary {
        let mut hosts = self.outcomes.clone();
        hosts.sort_by_key(|outcome| outcome.host);

        let mut failure_kinds = BTreeMap::new();
        for failure in self.outcomes.iter().flat_map(|outcome| &outcome.failures) {
            *failure_kinds.entry(failure.kind).or_insert(0) += 1;
        }

        let count = |status: HostStatus| hosts.iter().filter(|o| o.status == status).count();

        RunSummary {
            generated_at: Utc::now(),
            attempted: hosts.len(),
            succeeded: count(HostStatus::Success),
            partial: count(HostStatus::PartialFailure),
            failed: count(HostStatus::Failed),
            skipped: self.skipped.len(),
            software_records: self.software.len(),
            device_records: self.devices.len(),
            event_records: self.events.len(),
            failure_kinds,
            hosts,
        }
    }
}

/// Per-host status lines plus aggregate counts for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub attempted: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub software_records: usize,
    pub device_records: usize,
    pub event_records: usize,
    pub failure_kinds: BTreeMap<ErrorKind, usize>,
    pub hosts: Vec<HostOutcome>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.software_records + self.device_records + self.event_records
    }
}
