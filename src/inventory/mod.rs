//! Inventory records and per-host collection results

pub mod collector;
pub mod parse;
pub mod plan;

use crate::error::ErrorKind;
use crate::AuditError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub use collector::InventoryCollector;
pub use plan::CollectionPlan;

/// One installed application observed on a host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SoftwareRecord {
    #[serde(rename = "ip")]
    pub host: Ipv4Addr,
    #[serde(rename = "app_name")]
    pub name: String,
    pub user: String,
}

/// One attached peripheral observed on a host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "ip")]
    pub host: Ipv4Addr,
    #[serde(rename = "device_name")]
    pub name: String,
    pub user: String,
}

/// One historical device-connection event.
///
/// `timestamp` is the remote's own rendering, empty when the line carried
/// none that could be recognised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "ip")]
    pub host: Ipv4Addr,
    pub timestamp: String,
    pub event_id: Option<u32>,
    pub message: String,
    pub user: String,
}

/// Steps of the per-host collection sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionStep {
    Connect,
    Identity,
    Software,
    Devices,
    Events,
}

impl fmt::Display for CollectionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionStep::Connect => "connect",
            CollectionStep::Identity => "identity",
            CollectionStep::Software => "software",
            CollectionStep::Devices => "devices",
            CollectionStep::Events => "events",
        };
        f.write_str(name)
    }
}

/// A step that failed on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: CollectionStep,
    pub kind: ErrorKind,
    pub cause: String,
}

impl StepFailure {
    pub fn new(step: CollectionStep, error: &AuditError) -> Self {
        Self {
            step,
            kind: error.kind(),
            cause: error.short_cause(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.cause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    Success,
    PartialFailure,
    Failed,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostStatus::Success => "success",
            HostStatus::PartialFailure => "partial",
            HostStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal classification of one host's collection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOutcome {
    pub host: Ipv4Addr,
    pub status: HostStatus,
    pub failures: Vec<StepFailure>,
}

impl HostOutcome {
    /// Short cause string for summaries, `None` on success
    pub fn detail(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Everything one worker gathered for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInventory {
    pub host: Ipv4Addr,
    pub identity: Option<String>,
    pub software: Vec<SoftwareRecord>,
    pub devices: Vec<DeviceRecord>,
    pub events: Vec<EventRecord>,
    pub failures: Vec<StepFailure>,
}

impl HostInventory {
    pub fn new(host: Ipv4Addr) -> Self {
        Self {
            host,
            identity: None,
            software: Vec::new(),
            devices: Vec::new(),
            events: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Inventory for a host that never got past a required step
    pub fn failed(host: Ipv4Addr, step: CollectionStep, error: &AuditError) -> Self {
        let mut inventory = Self::new(host);
        inventory.failures.push(StepFailure::new(step, error));
        inventory
    }

    pub fn record_failure(&mut self, step: CollectionStep, error: &AuditError) {
        self.failures.push(StepFailure::new(step, error));
    }

    pub fn record_count(&self) -> usize {
        self.software.len() + self.devices.len() + self.events.len()
    }

    pub fn status(&self) -> HostStatus {
        if self.identity.is_none() {
            HostStatus::Failed
        } else if self.failures.is_empty() {
            HostStatus::Success
        } else {
            HostStatus::PartialFailure
        }
    }

    pub fn outcome(&self) -> HostOutcome {
        HostOutcome {
            host: self.host,
            status: self.status(),
            failures: self.failures.clone(),
        }
    }
}
