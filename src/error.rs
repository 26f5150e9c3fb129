//! Error handling for netaudit
//!
//! Every per-host failure is expressed as an [`AuditError`] and folded into
//! that host's outcome by the coordinator. Only [`AuditError::ConfigError`]
//! is allowed to abort a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for discovery and collection operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification used for run statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    Config,
    Transport,
    Authentication,
    Execution,
    Protocol,
    Report,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Transport => "transport",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Execution => "execution",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Report => "report",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::ConfigError(_) => ErrorKind::Config,
            AuditError::TransportError(_) => ErrorKind::Transport,
            AuditError::AuthenticationError(_) => ErrorKind::Authentication,
            AuditError::ExecutionError(_) => ErrorKind::Execution,
            AuditError::ProtocolError(_) => ErrorKind::Protocol,
            AuditError::ReportError(_) => ErrorKind::Report,
            AuditError::IoError(_) => ErrorKind::Io,
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuditError::ConfigError(_))
    }

    /// Whether a session that produced this error can keep running commands.
    ///
    /// Execution errors are scoped to a single command; everything else
    /// leaves the channel in an unknown state.
    pub fn leaves_session_usable(&self) -> bool {
        matches!(self, AuditError::ExecutionError(_))
    }

    /// Short single-line cause for summaries
    pub fn short_cause(&self) -> String {
        let text = self.to_string();
        let first = text.lines().next().unwrap_or_default();
        if first.chars().count() > 160 {
            let truncated: String = first.chars().take(157).collect();
            format!("{}...", truncated)
        } else {
            first.to_string()
        }
    }
}

/// Result type alias for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

impl From<reqwest::Error> for AuditError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            AuditError::AuthenticationError(e.to_string())
        } else if e.is_decode() {
            AuditError::ProtocolError(e.to_string())
        } else {
            AuditError::TransportError(e.to_string())
        }
    }
}

impl From<quick_xml::Error> for AuditError {
    fn from(e: quick_xml::Error) -> Self {
        AuditError::ProtocolError(format!("malformed XML: {}", e))
    }
}

impl From<csv::Error> for AuditError {
    fn from(e: csv::Error) -> Self {
        AuditError::ReportError(e.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        AuditError::ReportError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(AuditError::ConfigError("bad cidr".into()).is_fatal());
        assert!(!AuditError::TransportError("refused".into()).is_fatal());
        assert!(!AuditError::AuthenticationError("401".into()).is_fatal());
        assert!(!AuditError::ExecutionError("exit 1".into()).is_fatal());
        assert!(!AuditError::ProtocolError("bad xml".into()).is_fatal());
    }

    #[test]
    fn test_session_usability_after_error() {
        assert!(AuditError::ExecutionError("exit 1".into()).leaves_session_usable());
        assert!(!AuditError::ProtocolError("bad xml".into()).leaves_session_usable());
        assert!(!AuditError::TransportError("reset".into()).leaves_session_usable());
    }

    #[test]
    fn test_short_cause_is_single_line_and_bounded() {
        let err = AuditError::ExecutionError(format!("{}\nsecond line", "x".repeat(400)));
        let cause = err.short_cause();
        assert!(!cause.contains('\n'));
        assert_eq!(cause.chars().count(), 160);
        assert!(cause.ends_with("..."));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(AuditError::AuthenticationError("x".into()).kind().to_string(), "authentication");
        assert_eq!(ErrorKind::Protocol.to_string(), "protocol");
    }
}
