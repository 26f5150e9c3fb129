//! Simulated network for integration tests: a probe with a fixed set of
//! live addresses and a transport that answers each collection step from
//! a per-host script.

#![allow(dead_code)]

use netaudit::{
    AuditError, CommandResult, Credentials, LivenessProbe, Reachability, RemoteShell, SessionTransport,
};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Result<T> = std::result::Result<T, AuditError>;

pub fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 20, 0, last)
}

pub fn credentials() -> Arc<Credentials> {
    Arc::new(Credentials::new("CORP\\auditor", "hunter2"))
}

/// Probe that reports only the configured addresses as reachable
pub struct SimulatedProbe {
    up: HashSet<Ipv4Addr>,
    pub probes: AtomicUsize,
}

impl SimulatedProbe {
    pub fn new(up: &[Ipv4Addr]) -> Self {
        Self {
            up: up.iter().copied().collect(),
            probes: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl LivenessProbe for SimulatedProbe {
    async fn probe(&self, address: Ipv4Addr) -> Reachability {
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.up.contains(&address) {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        }
    }

    fn method_name(&self) -> &str {
        "simulated"
    }
}

/// How one remote step answers
#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    Exit(i32, String),
    Fault(String),
    /// Response that cannot be decoded; leaves the session unusable
    Garbled(String),
}

impl Reply {
    pub fn lines(lines: &[&str]) -> Self {
        Reply::Output(lines.join("\r\n"))
    }

    fn answer(&self) -> Result<CommandResult> {
        match self {
            Reply::Output(stdout) => Ok(CommandResult::new(stdout.clone(), "", 0)),
            Reply::Exit(status, stderr) => Ok(CommandResult::new("", stderr.clone(), *status)),
            Reply::Fault(reason) => Err(AuditError::ExecutionError(reason.clone())),
            Reply::Garbled(reason) => Err(AuditError::ProtocolError(reason.clone())),
        }
    }
}

/// Behaviour of one simulated host
#[derive(Debug, Clone)]
pub struct HostScript {
    pub reject_auth: bool,
    pub identity: Reply,
    pub software: Reply,
    pub devices: Reply,
    pub events: Reply,
}

impl HostScript {
    pub fn healthy(user: &str) -> Self {
        Self {
            reject_auth: false,
            identity: Reply::Output(format!("{}\r\n", user)),
            software: Reply::lines(&["7-Zip 23.01 (x64)", "Google Chrome", "Microsoft Edge"]),
            devices: Reply::lines(&["USB Root Hub (USB 3.0)", "USB Composite Device"]),
            events: Reply::lines(&[
                "2026-10-14T08:31:55.0000000+00:00\t2003\tThe UMDF Host Process has been asked to load drivers.",
                "2026-10-13T17:02:11.0000000+00:00\t2100\tReceived a Pnp or Power operation (27, 23).",
            ]),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject_auth: true,
            ..Self::healthy("unused")
        }
    }
}

/// Transport answering from [`HostScript`]s; unknown hosts refuse connections
pub struct SimulatedTransport {
    hosts: HashMap<Ipv4Addr, HostScript>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl SimulatedTransport {
    pub fn new(hosts: impl IntoIterator<Item = (Ipv4Addr, HostScript)>) -> Self {
        Self {
            hosts: hosts.into_iter().collect(),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl SessionTransport for SimulatedTransport {
    type Shell = SimulatedShell;

    async fn open(&self, host: Ipv4Addr, _credentials: &Credentials) -> Result<SimulatedShell> {
        let script = self
            .hosts
            .get(&host)
            .ok_or_else(|| AuditError::TransportError(format!("connection refused by {}", host)))?;
        if script.reject_auth {
            return Err(AuditError::AuthenticationError(format!("{} returned 401 Unauthorized", host)));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedShell {
            script: script.clone(),
            closed: self.closed.clone(),
        })
    }

    fn protocol_name(&self) -> &str {
        "simulated"
    }
}

pub struct SimulatedShell {
    script: HostScript,
    closed: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl RemoteShell for SimulatedShell {
    async fn run_command(&mut self, _command: &str) -> Result<CommandResult> {
        tokio::task::yield_now().await;
        self.script.identity.answer()
    }

    async fn run_script(&mut self, script: &str) -> Result<CommandResult> {
        tokio::task::yield_now().await;
        if script.contains("Uninstall") {
            self.script.software.answer()
        } else if script.contains("Get-PnpDevice") {
            self.script.devices.answer()
        } else if script.contains("Get-WinEvent") {
            self.script.events.answer()
        } else {
            Ok(CommandResult::new("", format!("unexpected script: {}", script), 1))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
