//! Per-host inventory collection over an open session

use super::parse::{parse_event_line, parse_identity, record_lines};
use super::*;
use crate::credentials::Credentials;
use crate::session::{CommandResult, RemoteSessionClient, SessionState, SessionTransport};
use crate::{AuditError, Result};
use log::{debug, info, warn};

/// Runs the fixed step sequence on one authenticated session
#[derive(Debug, Clone, Default)]
pub struct InventoryCollector {
    plan: CollectionPlan,
}

impl InventoryCollector {
    pub fn new(plan: CollectionPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &CollectionPlan {
        &self.plan
    }

    /// Collect identity, software, devices and events from `session`.
    ///
    /// The session must already be connected. If a step leaves it `Failed`,
    /// it is closed and replaced with a fresh session opened with
    /// `credentials` before the next step. The final session is left open;
    /// closing it is the caller's job.
    pub async fn collect<T: SessionTransport>(
        &self,
        session: &mut RemoteSessionClient<T>,
        credentials: &Credentials,
    ) -> HostInventory {
        let host = session.host();
        let mut inventory = HostInventory::new(host);

        let identity = match self.identity(session).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!("{}: identity lookup failed, skipping host: {}", host, e);
                inventory.record_failure(CollectionStep::Identity, &e);
                return inventory;
            }
        };
        debug!("{}: collecting as {}", host, identity);
        inventory.identity = Some(identity.clone());

        let software = match reopen_if_failed(session, credentials).await {
            Ok(()) => self.software(session, &identity).await,
            Err(e) => Err(e),
        };
        match software {
            Ok(records) => inventory.software = records,
            Err(e) => {
                warn!("{}: software step failed: {}", host, e);
                inventory.record_failure(CollectionStep::Software, &e);
            }
        }

        let devices = match reopen_if_failed(session, credentials).await {
            Ok(()) => self.devices(session, &identity).await,
            Err(e) => Err(e),
        };
        match devices {
            Ok(records) => inventory.devices = records,
            Err(e) => {
                warn!("{}: device step failed: {}", host, e);
                inventory.record_failure(CollectionStep::Devices, &e);
            }
        }

        let events = match reopen_if_failed(session, credentials).await {
            Ok(()) => self.events(session, &identity).await,
            Err(e) => Err(e),
        };
        match events {
            Ok(records) => inventory.events = records,
            Err(e) => {
                warn!("{}: event step failed: {}", host, e);
                inventory.record_failure(CollectionStep::Events, &e);
            }
        }

        info!(
            "{}: {} software, {} devices, {} events ({})",
            host,
            inventory.software.len(),
            inventory.devices.len(),
            inventory.events.len(),
            inventory.status()
        );
        inventory
    }

    async fn identity<T: SessionTransport>(&self, session: &mut RemoteSessionClient<T>) -> Result<String> {
        let result = session.run_command(&self.plan.identity_command).await?;
        let stdout = checked(CollectionStep::Identity, result)?;
        parse_identity(&stdout).ok_or_else(|| {
            AuditError::ExecutionError(format!("{} returned no identity", self.plan.identity_command))
        })
    }

    async fn software<T: SessionTransport>(
        &self,
        session: &mut RemoteSessionClient<T>,
        user: &str,
    ) -> Result<Vec<SoftwareRecord>> {
        let host = session.host();
        let result = session.run_script(&self.plan.software_script).await?;
        let stdout = checked(CollectionStep::Software, result)?;

        Ok(record_lines(&stdout)
            .into_iter()
            .map(|name| SoftwareRecord {
                host,
                name: name.to_string(),
                user: user.to_string(),
            })
            .collect())
    }

    async fn devices<T: SessionTransport>(
        &self,
        session: &mut RemoteSessionClient<T>,
        user: &str,
    ) -> Result<Vec<DeviceRecord>> {
        let host = session.host();
        let result = session.run_script(&self.plan.device_script).await?;
        let stdout = checked(CollectionStep::Devices, result)?;

        Ok(record_lines(&stdout)
            .into_iter()
            .map(|name| DeviceRecord {
                host,
                name: name.to_string(),
                user: user.to_string(),
            })
            .collect())
    }

    async fn events<T: SessionTransport>(
        &self,
        session: &mut RemoteSessionClient<T>,
        user: &str,
    ) -> Result<Vec<EventRecord>> {
        let host = session.host();
        let result = session.run_script(&self.plan.event_script()).await?;
        let stdout = checked(CollectionStep::Events, result)?;

        // The remote query is asked for N, but the window holds regardless
        Ok(record_lines(&stdout)
            .into_iter()
            .take(self.plan.event_window)
            .map(|line| {
                let parsed = parse_event_line(line);
                EventRecord {
                    host,
                    timestamp: parsed.timestamp,
                    event_id: parsed.event_id,
                    message: parsed.message,
                    user: user.to_string(),
                }
            })
            .collect())
    }
}

/// Replace a session an earlier step left `Failed` with a newly connected one.
///
/// On error `session` stays `Failed`, so the next step tries again.
async fn reopen_if_failed<T: SessionTransport>(
    session: &mut RemoteSessionClient<T>,
    credentials: &Credentials,
) -> Result<()> {
    if session.state() != SessionState::Failed {
        return Ok(());
    }

    info!("{}: session failed, reconnecting for the remaining steps", session.host());
    session.close().await;
    let mut fresh = session.renewed();
    fresh.connect(credentials).await?;
    *session = fresh;
    Ok(())
}

/// Stdout of a successful run; a non-zero status is an execution error
fn checked(step: CollectionStep, result: CommandResult) -> Result<String> {
    if result.success() {
        if !result.stderr.trim().is_empty() {
            debug!("{} step wrote to stderr: {}", step, result.stderr.trim());
        }
        return Ok(result.stdout);
    }

    let stderr = result.stderr.trim();
    let cause = if stderr.is_empty() {
        format!("exit status {}", result.status)
    } else {
        format!("exit status {}: {}", result.status, stderr)
    };
    Err(AuditError::ExecutionError(cause))
}
