//! Configuration module for netaudit

use crate::discovery::AddressRange;
use crate::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default WinRM HTTP listener port
pub const DEFAULT_WINRM_PORT: u16 = 5985;

/// Event ids recorded by DriverFrameworks-UserMode when a device is
/// connected (2003) or its host process starts loading drivers (2100)
pub const DEFAULT_EVENT_IDS: [u32; 2] = [2003, 2100];

/// File descriptors kept free for sessions, logs and report files while
/// scanning
pub const RESERVED_FDS: u64 = 64;

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Main configuration structure for an audit run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Network to audit in CIDR notation
    pub target: String,

    /// Remote management port used both for liveness and sessions
    pub port: u16,

    /// Liveness probe timeout in milliseconds
    pub probe_timeout: u64,

    /// Timeout for each remote session operation in milliseconds
    pub operation_timeout: u64,

    /// Concurrent liveness probes
    pub scan_parallelism: usize,

    /// Concurrent host collections
    pub collect_parallelism: usize,

    /// Most recent N device events collected per host
    pub event_window: usize,

    /// Event ids the event-log query is filtered to
    pub event_ids: Vec<u32>,

    /// Extra connect attempts after a transport failure
    pub connect_retries: u32,

    /// Overall run deadline in seconds
    pub deadline: Option<u64>,

    /// Use https for the session endpoint
    pub use_tls: bool,

    /// Directory reports are written to
    pub output_dir: PathBuf,

    pub output_format: OutputFormat,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            target: "192.168.1.0/24".to_string(),
            port: DEFAULT_WINRM_PORT,
            probe_timeout: 500,
            operation_timeout: 60_000,
            scan_parallelism: 256,
            collect_parallelism: num_cpus::get().max(1) * 4,
            event_window: 50,
            event_ids: DEFAULT_EVENT_IDS.to_vec(),
            connect_retries: 0,
            deadline: None,
            use_tls: false,
            output_dir: PathBuf::from("."),
            output_format: OutputFormat::Csv,
        }
    }
}

impl AuditConfig {
    /// Create a new configuration for the given network
    pub fn new(target: String) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_probe_timeout(mut self, millis: u64) -> Self {
        self.probe_timeout = millis;
        self
    }

    pub fn with_operation_timeout(mut self, millis: u64) -> Self {
        self.operation_timeout = millis;
        self
    }

    pub fn with_scan_parallelism(mut self, parallelism: usize) -> Self {
        self.scan_parallelism = parallelism;
        self
    }

    pub fn with_collect_parallelism(mut self, parallelism: usize) -> Self {
        self.collect_parallelism = parallelism;
        self
    }

    pub fn with_event_window(mut self, window: usize) -> Self {
        self.event_window = window;
        self
    }

    pub fn with_deadline(mut self, seconds: Option<u64>) -> Self {
        self.deadline = seconds;
        self
    }

    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.probe_timeout)
    }

    pub fn operation_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.operation_timeout)
    }

    pub fn deadline_duration(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_secs)
    }

    /// Lower scan parallelism so every in-flight probe can hold a socket
    /// under `fd_limit`. Returns the new value if it had to change.
    pub fn fit_scan_parallelism(&mut self, fd_limit: u64) -> Option<usize> {
        let available = fd_limit.saturating_sub(RESERVED_FDS).max(1);
        let cap = usize::try_from(available).unwrap_or(usize::MAX);
        if self.scan_parallelism > cap {
            self.scan_parallelism = cap;
            Some(cap)
        } else {
            None
        }
    }

    /// Parse the configured target into an address range
    pub fn address_range(&self) -> Result<AddressRange> {
        self.target.parse()
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AuditError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| AuditError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from `~/.netaudit.toml` if present
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = home_dir.join(".netaudit.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.address_range()?;

        if self.port == 0 {
            return Err(AuditError::ConfigError("Port must be greater than 0".to_string()));
        }

        if self.scan_parallelism == 0 || self.collect_parallelism == 0 {
            return Err(AuditError::ConfigError(
                "Parallelism must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout == 0 || self.operation_timeout == 0 {
            return Err(AuditError::ConfigError("Timeouts must be greater than 0".to_string()));
        }

        if self.event_window == 0 {
            return Err(AuditError::ConfigError(
                "Event window must be greater than 0".to_string(),
            ));
        }

        if self.event_ids.is_empty() {
            return Err(AuditError::ConfigError("At least one event id is required".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AuditConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 5985);
        assert_eq!(config.event_window, 50);
        assert_eq!(config.event_ids, vec![2003, 2100]);
        assert!(config.collect_parallelism > 1);
        assert!(config.scan_parallelism > 1);
    }

    #[test]
    fn test_invalid_target_is_config_error() {
        let config = AuditConfig::new("10.0.0.0/99".to_string());
        assert!(matches!(config.validate(), Err(AuditError::ConfigError(_))));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = AuditConfig::default().with_collect_parallelism(0);
        assert!(config.validate().is_err());

        let config = AuditConfig::default().with_scan_parallelism(1).with_collect_parallelism(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_parallelism_fits_fd_limit() {
        let mut config = AuditConfig::default().with_scan_parallelism(usize::MAX);
        assert_eq!(config.fit_scan_parallelism(1024), Some(960));
        assert_eq!(config.scan_parallelism, 960);

        // Already within the limit
        assert_eq!(config.fit_scan_parallelism(4096), None);
        assert_eq!(config.scan_parallelism, 960);

        let mut config = AuditConfig::default().with_scan_parallelism(8);
        assert_eq!(config.fit_scan_parallelism(16), Some(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AuditConfig = toml::from_str(
            r#"
            target = "10.1.2.0/28"
            event_window = 10
            output_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.target, "10.1.2.0/28");
        assert_eq!(config.event_window, 10);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.port, DEFAULT_WINRM_PORT);
        assert_eq!(config.probe_timeout_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netaudit.toml");
        fs::write(&path, "target = \"172.16.0.0/30\"\ndeadline = 120\n").unwrap();

        let config = AuditConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.deadline_duration(), Some(Duration::from_secs(120)));
        assert_eq!(config.address_range().unwrap().len(), 4);

        assert!(AuditConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
