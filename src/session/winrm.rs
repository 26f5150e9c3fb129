//! WinRM transport - WS-Management over HTTP(S) with Basic authentication
//!
//! Requires a listener configured with `Basic` auth enabled (and
//! `AllowUnencrypted` when running over plain http on 5985).

use super::soap::{self, Envelope};
use super::*;
use crate::AuditError;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";
/// Upper bound for a single Receive long-poll
const MAX_RECEIVE_POLL: Duration = Duration::from_secs(20);

/// Endpoint settings for [`WinRmTransport`]
#[derive(Debug, Clone)]
pub struct WinRmConfig {
    pub port: u16,
    pub use_tls: bool,
    /// HTTP request timeout; also bounds each Receive poll
    pub operation_timeout: Duration,
}

impl Default for WinRmConfig {
    fn default() -> Self {
        Self {
            port: crate::config::DEFAULT_WINRM_PORT,
            use_tls: false,
            operation_timeout: Duration::from_secs(60),
        }
    }
}

impl WinRmConfig {
    fn receive_poll(&self) -> Duration {
        (self.operation_timeout / 2).clamp(Duration::from_secs(1), MAX_RECEIVE_POLL)
    }
}

/// Opens WinRM cmd shells. One HTTP client (and its connection pool) is
/// shared across every host.
pub struct WinRmTransport {
    client: reqwest::Client,
    config: WinRmConfig,
}

impl WinRmTransport {
    pub fn new(config: WinRmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.operation_timeout)
            .connect_timeout(config.operation_timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| AuditError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self, host: Ipv4Addr) -> String {
        let scheme = if self.config.use_tls { "https" } else { "http" };
        format!("{}://{}:{}/wsman", scheme, host, self.config.port)
    }
}

#[async_trait::async_trait]
impl SessionTransport for WinRmTransport {
    type Shell = WinRmShell;

    async fn open(&self, host: Ipv4Addr, credentials: &Credentials) -> Result<WinRmShell> {
        let mut shell = WinRmShell {
            client: self.client.clone(),
            endpoint: self.endpoint(host),
            credentials: credentials.clone(),
            poll: self.config.receive_poll(),
            shell_id: None,
        };

        let envelope = Envelope::new(&shell.endpoint, soap::ACTION_CREATE, shell.poll)
            .option("WINRS_NOPROFILE", "FALSE")
            .option("WINRS_CODEPAGE", "65001")
            .body(soap::create_shell_body())
            .render();
        let response = shell.post(envelope).await?;
        let shell_id = soap::parse_shell_id(&response)?;
        debug!("Created WinRM shell {} on {}", shell_id, host);

        shell.shell_id = Some(shell_id);
        Ok(shell)
    }

    fn protocol_name(&self) -> &str {
        "winrm"
    }
}

/// An open `cmd` shell on a WinRM listener
pub struct WinRmShell {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    poll: Duration,
    shell_id: Option<String>,
}

/// Successful exchange, or a Receive poll that elapsed with no new output
enum Reply {
    Body(String),
    PollTimedOut(String),
}

impl WinRmShell {
    async fn post(&self, envelope: String) -> Result<String> {
        match self.exchange(envelope).await? {
            Reply::Body(body) => Ok(body),
            Reply::PollTimedOut(reason) => Err(AuditError::TransportError(format!(
                "WinRM operation timeout: {}",
                reason
            ))),
        }
    }

    async fn exchange(&self, envelope: String) -> Result<Reply> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(self.credentials.secret.expose()))
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => Ok(Reply::Body(body)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuditError::AuthenticationError(format!(
                "{} rejected credentials for {} ({})",
                self.endpoint, self.credentials.username, status
            ))),
            _ => match soap::parse_fault(&body) {
                Some(fault) if fault.is_operation_timeout() => Ok(Reply::PollTimedOut(fault.reason)),
                Some(fault) => Err(AuditError::ExecutionError(fault.reason)),
                None => Err(AuditError::TransportError(format!(
                    "{} returned HTTP {}",
                    self.endpoint, status
                ))),
            },
        }
    }

    fn shell_id(&self) -> Result<&str> {
        self.shell_id
            .as_deref()
            .ok_or_else(|| AuditError::ExecutionError("WinRM shell already deleted".to_string()))
    }

    async fn run(&mut self, command: &str, arguments: &[&str]) -> Result<CommandResult> {
        let shell_id = self.shell_id()?.to_string();

        let envelope = Envelope::new(&self.endpoint, soap::ACTION_COMMAND, self.poll)
            .shell(&shell_id)
            .option("WINRS_CONSOLEMODE_STDIN", "TRUE")
            .option("WINRS_SKIP_CMD_SHELL", "FALSE")
            .body(soap::command_body(command, arguments))
            .render();
        let command_id = soap::parse_command_id(&self.post(envelope).await?)?;

        let outcome = self.receive_all(&shell_id, &command_id).await;
        if let Err(e) = self.terminate(&shell_id, &command_id).await {
            debug!("Terminate signal for {} failed: {}", command_id, e);
        }
        outcome
    }

    async fn receive_all(&self, shell_id: &str, command_id: &str) -> Result<CommandResult> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let envelope = Envelope::new(&self.endpoint, soap::ACTION_RECEIVE, self.poll)
                .shell(shell_id)
                .option("WSMAN_CMDSHELL_OPTION_KEEPALIVE", "TRUE")
                .body(soap::receive_body(command_id))
                .render();

            let response = match self.exchange(envelope).await? {
                Reply::Body(body) => body,
                Reply::PollTimedOut(_) => continue,
            };

            let chunk = soap::parse_receive(&response)?;
            stdout.extend_from_slice(&chunk.stdout);
            stderr.extend_from_slice(&chunk.stderr);

            if chunk.done {
                return Ok(CommandResult {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    status: chunk.exit_code.unwrap_or(0),
                });
            }
        }
    }

    async fn terminate(&self, shell_id: &str, command_id: &str) -> Result<()> {
        let envelope = Envelope::new(&self.endpoint, soap::ACTION_SIGNAL, self.poll)
            .shell(shell_id)
            .body(soap::terminate_body(command_id))
            .render();
        self.post(envelope).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl RemoteShell for WinRmShell {
    async fn run_command(&mut self, command: &str) -> Result<CommandResult> {
        self.run(command, &[]).await
    }

    async fn run_script(&mut self, script: &str) -> Result<CommandResult> {
        // Silence progress records, which otherwise arrive on stderr as CLIXML
        let script = format!("$ProgressPreference = 'SilentlyContinue'\n{}", script);
        let encoded = soap::encode_powershell(&script);
        self.run(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-EncodedCommand", encoded.as_str()],
        )
        .await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(shell_id) = self.shell_id.take() else {
            return Ok(());
        };

        let envelope = Envelope::new(&self.endpoint, soap::ACTION_DELETE, self.poll)
            .shell(&shell_id)
            .render();
        if let Err(e) = self.post(envelope).await {
            warn!("Failed to delete WinRM shell {} at {}: {}", shell_id, self.endpoint, e);
            return Err(e);
        }
        Ok(())
    }
}
