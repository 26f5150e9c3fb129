//! netaudit - subnet discovery and remote Windows inventory
//!
//! Probes an IPv4 range for hosts listening on the remote management port,
//! opens a session to each, and collects installed software, attached USB
//! devices and device-connection events into one aggregate report.

pub mod collection;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod inventory;
pub mod output;
pub mod session;

// Re-export commonly used types
pub use collection::{AuditReport, CollectionCoordinator, CoordinatorOptions, RunSummary};
pub use config::{AuditConfig, OutputFormat};
pub use credentials::{Credentials, Secret};
pub use discovery::{AddressRange, Host, HostScanner, LivenessProbe, Reachability, TcpConnectProbe};
pub use error::{AuditError, AuditResult, ErrorKind};
pub use inventory::{
    CollectionPlan, DeviceRecord, EventRecord, HostInventory, HostOutcome, HostStatus, InventoryCollector,
    SoftwareRecord,
};
pub use output::{CsvReportSink, JsonReportSink, ReportSink};
pub use session::{
    CommandResult, RemoteSessionClient, RemoteShell, SessionOptions, SessionState, SessionTransport, WinRmConfig,
    WinRmTransport,
};

pub type Result<T> = std::result::Result<T, AuditError>;
