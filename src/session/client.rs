//! Session client enforcing the per-host lifecycle

use super::*;
use crate::AuditError;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy)]
enum ExecKind {
    Command,
    Script,
}

/// One authenticated session to one host.
///
/// Never shared across hosts. Call [`close`](Self::close) on every exit
/// path; dropping an open client schedules a best-effort release on the
/// current runtime.
pub struct RemoteSessionClient<T: SessionTransport> {
    transport: Arc<T>,
    host: Ipv4Addr,
    options: SessionOptions,
    state: SessionState,
    identity: Option<String>,
    shell: Option<T::Shell>,
}

impl<T: SessionTransport> RemoteSessionClient<T> {
    pub fn new(transport: Arc<T>, host: Ipv4Addr, options: SessionOptions) -> Self {
        Self {
            transport,
            host,
            options,
            state: SessionState::Init,
            identity: None,
            shell: None,
        }
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    /// A new, unconnected client to the same host with the same options
    pub fn renewed(&self) -> Self {
        Self::new(Arc::clone(&self.transport), self.host, self.options)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Account the session authenticated as
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Connect and authenticate. No retries happen here.
    pub async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        if self.state != SessionState::Init {
            return Err(AuditError::ExecutionError(format!(
                "connect called on {} session to {}",
                self.state, self.host
            )));
        }

        self.state = SessionState::Connecting;
        debug!(
            "Opening {} session to {} as {}",
            self.transport.protocol_name(),
            self.host,
            credentials.username
        );

        let opened = bounded(
            "connect",
            self.host,
            self.options.operation_timeout,
            self.transport.open(self.host, credentials),
        )
        .await;

        match opened {
            Ok(shell) => {
                self.shell = Some(shell);
                self.identity = Some(credentials.username.clone());
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    pub async fn run_command(&mut self, command: &str) -> Result<CommandResult> {
        self.execute(ExecKind::Command, command).await
    }

    pub async fn run_script(&mut self, script: &str) -> Result<CommandResult> {
        self.execute(ExecKind::Script, script).await
    }

    async fn execute(&mut self, kind: ExecKind, text: &str) -> Result<CommandResult> {
        if !self.state.is_runnable() {
            return Err(AuditError::ExecutionError(format!(
                "session to {} is {}, cannot run {:?}",
                self.host, self.state, kind
            )));
        }

        let host = self.host;
        let op_timeout = self.options.operation_timeout;
        let shell = self.shell.as_mut().ok_or_else(|| {
            AuditError::ExecutionError(format!("session to {} has no open shell", host))
        })?;

        self.state = SessionState::Executing;
        let pending = match kind {
            ExecKind::Command => shell.run_command(text),
            ExecKind::Script => shell.run_script(text),
        };
        let what = match kind {
            ExecKind::Command => "command",
            ExecKind::Script => "script",
        };
        let outcome = bounded(what, host, op_timeout, pending).await;

        match outcome {
            Ok(result) => {
                self.state = SessionState::Ready;
                Ok(result)
            }
            Err(e) if e.leaves_session_usable() => {
                self.state = SessionState::Ready;
                Err(e)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Release the connection. Idempotent; a failed session stays `Failed`.
    pub async fn close(&mut self) {
        if let Some(mut shell) = self.shell.take() {
            match bounded("close", self.host, self.options.operation_timeout, shell.close()).await {
                Ok(()) => debug!("Closed session to {}", self.host),
                Err(e) => warn!("Failed to release session to {}: {}", self.host, e),
            }
        }

        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
    }
}

/// Apply the operation timeout; expiry is a transport failure
async fn bounded<F, R>(what: &str, host: Ipv4Addr, limit: Duration, fut: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AuditError::TransportError(format!(
            "{} on {} timed out after {:?}",
            what, host, limit
        ))),
    }
}

impl<T: SessionTransport> Drop for RemoteSessionClient<T> {
    fn drop(&mut self) {
        let Some(mut shell) = self.shell.take() else {
            return;
        };

        warn!("Session to {} dropped while open, releasing in background", self.host);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let op_timeout = self.options.operation_timeout;
            handle.spawn(async move {
                let _ = timeout(op_timeout, shell.close()).await;
            });
        }
    }
}
