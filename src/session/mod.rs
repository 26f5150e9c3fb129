//! Remote management sessions
//!
//! [`RemoteSessionClient`] owns one authenticated channel to one host and
//! enforces the session lifecycle:
//!
//! ```text
//! Init -> Connecting -> Authenticated -> Ready <-> Executing -> Closed
//!            |               |                        |
//!            +---------------+----------> Failed <----+
//! ```
//!
//! The wire protocol sits behind [`SessionTransport`] and [`RemoteShell`];
//! [`winrm`] provides the WS-Management implementation.

pub mod client;
pub mod soap;
pub mod winrm;

use crate::credentials::Credentials;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

pub use client::RemoteSessionClient;
pub use winrm::{WinRmConfig, WinRmShell, WinRmTransport};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Init,
    Connecting,
    Authenticated,
    Ready,
    Executing,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether commands may be issued in this state
    pub fn is_runnable(self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Raw output of one remote command or script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status,
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Opens authenticated shells on remote hosts
#[async_trait::async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    type Shell: RemoteShell;

    /// Connect to `host` and authenticate, yielding a shell ready for commands.
    ///
    /// Credential rejection must surface as `AuthenticationError` and
    /// network-level failure as `TransportError`.
    async fn open(&self, host: Ipv4Addr, credentials: &Credentials) -> Result<Self::Shell>;

    fn protocol_name(&self) -> &str;
}

/// An open remote shell
#[async_trait::async_trait]
pub trait RemoteShell: Send + 'static {
    /// Run a command line through the remote command interpreter
    async fn run_command(&mut self, command: &str) -> Result<CommandResult>;

    /// Run a script through the remote scripting interpreter
    async fn run_script(&mut self, script: &str) -> Result<CommandResult>;

    /// Release the remote shell
    async fn close(&mut self) -> Result<()>;
}

/// Per-session timing
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub operation_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(60),
        }
    }
}
