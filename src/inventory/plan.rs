//! Remote commands run by the collector, one per step

use crate::config::{AuditConfig, DEFAULT_EVENT_IDS};

/// Operational log written by the user-mode driver framework on device arrival
pub const DEVICE_EVENT_LOG: &str = "Microsoft-Windows-DriverFrameworks-UserMode/Operational";

const IDENTITY_COMMAND: &str = "whoami";

/// Display names from both registry views of the Uninstall key
const SOFTWARE_SCRIPT: &str = r#"Get-ItemProperty 'HKLM:\Software\Microsoft\Windows\CurrentVersion\Uninstall\*', 'HKLM:\Software\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall\*' -ErrorAction SilentlyContinue |
    Where-Object { $_.DisplayName } |
    Select-Object -ExpandProperty DisplayName"#;

const DEVICE_SCRIPT: &str = r#"Get-PnpDevice -Class USB -PresentOnly -ErrorAction Stop |
    Where-Object { $_.FriendlyName } |
    Select-Object -ExpandProperty FriendlyName"#;

/// What to run for each collection step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPlan {
    pub identity_command: String,
    pub software_script: String,
    pub device_script: String,
    pub event_log: String,
    pub event_ids: Vec<u32>,
    /// Most recent N events kept per host
    pub event_window: usize,
}

impl Default for CollectionPlan {
    fn default() -> Self {
        Self {
            identity_command: IDENTITY_COMMAND.to_string(),
            software_script: SOFTWARE_SCRIPT.to_string(),
            device_script: DEVICE_SCRIPT.to_string(),
            event_log: DEVICE_EVENT_LOG.to_string(),
            event_ids: DEFAULT_EVENT_IDS.to_vec(),
            event_window: 50,
        }
    }
}

impl CollectionPlan {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            event_ids: config.event_ids.clone(),
            event_window: config.event_window,
            ..Default::default()
        }
    }

    pub fn with_event_window(mut self, window: usize) -> Self {
        self.event_window = window;
        self
    }

    /// Event query emitting one `timestamp<TAB>id<TAB>message` line per event,
    /// newest first. An empty log is zero lines, not an error.
    pub fn event_script(&self) -> String {
        let ids = self
            .event_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        format!(
            r#"try {{
    Get-WinEvent -FilterHashtable @{{ LogName = '{log}'; Id = {ids} }} -MaxEvents {window} -ErrorAction Stop |
        ForEach-Object {{ '{{0:o}}{{1}}{{2}}{{1}}{{3}}' -f $_.TimeCreated, "`t", $_.Id, ($_.Message -replace '\s+', ' ') }}
}} catch {{
    if ($_.FullyQualifiedErrorId -notmatch 'NoMatchingEventsFound') {{ throw }}
}}"#,
            log = self.event_log,
            ids = ids,
            window = self.event_window,
        )
    }
}
