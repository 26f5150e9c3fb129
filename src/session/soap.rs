//! WS-Management SOAP envelopes for the Windows Remote Shell resource
//!
//! Only the operations the session layer needs are modelled: create shell,
//! run command, receive output, signal terminate and delete shell.

use crate::{AuditError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;

const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_ADDRESSING: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const NS_WSMAN: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
const NS_SHELL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";
const ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

pub const RESOURCE_CMD: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
pub const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
pub const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
pub const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
pub const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
pub const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";
const SIGNAL_TERMINATE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
const STATE_DONE_SUFFIX: &str = "CommandState/Done";

const MAX_ENVELOPE_SIZE: u32 = 153_600;

/// Builder for one request envelope
pub struct Envelope<'a> {
    endpoint: &'a str,
    action: &'a str,
    operation_timeout: Duration,
    shell_id: Option<&'a str>,
    options: Vec<(&'a str, &'a str)>,
    body: String,
}

impl<'a> Envelope<'a> {
    pub fn new(endpoint: &'a str, action: &'a str, operation_timeout: Duration) -> Self {
        Self {
            endpoint,
            action,
            operation_timeout,
            shell_id: None,
            options: Vec::new(),
            body: String::new(),
        }
    }

    pub fn shell(mut self, shell_id: &'a str) -> Self {
        self.shell_id = Some(shell_id);
        self
    }

    pub fn option(mut self, name: &'a str, value: &'a str) -> Self {
        self.options.push((name, value));
        self
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    pub fn render(&self) -> String {
        self.render_with_id(&uuid::Uuid::new_v4().to_string().to_uppercase())
    }

    fn render_with_id(&self, message_id: &str) -> String {
        let mut xml = String::with_capacity(1024 + self.body.len());
        xml.push_str(&format!(
            "<s:Envelope xmlns:s=\"{}\" xmlns:a=\"{}\" xmlns:w=\"{}\" xmlns:rsp=\"{}\">",
            NS_SOAP, NS_ADDRESSING, NS_WSMAN, NS_SHELL
        ));
        xml.push_str("<s:Header>");
        xml.push_str(&format!("<a:To>{}</a:To>", escape(self.endpoint)));
        xml.push_str(&format!(
            "<a:ReplyTo><a:Address s:mustUnderstand=\"true\">{}</a:Address></a:ReplyTo>",
            ANONYMOUS
        ));
        xml.push_str(&format!(
            "<w:MaxEnvelopeSize s:mustUnderstand=\"true\">{}</w:MaxEnvelopeSize>",
            MAX_ENVELOPE_SIZE
        ));
        xml.push_str(&format!("<a:MessageID>uuid:{}</a:MessageID>", message_id));
        xml.push_str("<w:Locale xml:lang=\"en-US\" s:mustUnderstand=\"false\"/>");
        xml.push_str(&format!(
            "<w:OperationTimeout>PT{}S</w:OperationTimeout>",
            self.operation_timeout.as_secs().max(1)
        ));
        xml.push_str(&format!(
            "<w:ResourceURI s:mustUnderstand=\"true\">{}</w:ResourceURI>",
            RESOURCE_CMD
        ));
        xml.push_str(&format!("<a:Action s:mustUnderstand=\"true\">{}</a:Action>", self.action));
        if let Some(shell_id) = self.shell_id {
            xml.push_str(&format!(
                "<w:SelectorSet><w:Selector Name=\"ShellId\">{}</w:Selector></w:SelectorSet>",
                escape(shell_id)
            ));
        }
        if !self.options.is_empty() {
            xml.push_str("<w:OptionSet>");
            for (name, value) in &self.options {
                xml.push_str(&format!("<w:Option Name=\"{}\">{}</w:Option>", name, value));
            }
            xml.push_str("</w:OptionSet>");
        }
        xml.push_str("</s:Header><s:Body>");
        xml.push_str(&self.body);
        xml.push_str("</s:Body></s:Envelope>");
        xml
    }
}

pub fn create_shell_body() -> String {
    "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams>\
     <rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>"
        .to_string()
}

pub fn command_body(command: &str, arguments: &[&str]) -> String {
    let mut body = format!("<rsp:CommandLine><rsp:Command>{}</rsp:Command>", escape(command));
    for arg in arguments {
        body.push_str(&format!("<rsp:Arguments>{}</rsp:Arguments>", escape(*arg)));
    }
    body.push_str("</rsp:CommandLine>");
    body
}

pub fn receive_body(command_id: &str) -> String {
    format!(
        "<rsp:Receive><rsp:DesiredStream CommandId=\"{}\">stdout stderr</rsp:DesiredStream></rsp:Receive>",
        escape(command_id)
    )
}

pub fn terminate_body(command_id: &str) -> String {
    format!(
        "<rsp:Signal CommandId=\"{}\"><rsp:Code>{}</rsp:Code></rsp:Signal>",
        escape(command_id),
        SIGNAL_TERMINATE
    )
}

/// PowerShell `-EncodedCommand` payload: base64 of the UTF-16LE script
pub fn encode_powershell(script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    STANDARD.encode(utf16)
}

/// One decoded `Receive` response
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiveChunk {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub done: bool,
    pub exit_code: Option<i32>,
}

/// A SOAP fault returned by the listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: Option<String>,
    pub reason: String,
}

impl Fault {
    /// `w:TimedOut` means a Receive poll elapsed with no new output
    pub fn is_operation_timeout(&self) -> bool {
        self.code.as_deref().map_or(false, |c| c.ends_with("TimedOut"))
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| AuditError::ProtocolError(format!("bad attribute: {}", err)))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value()?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Extract the shell id from a Create response
pub fn parse_shell_id(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut capture = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                capture = match local.as_ref() {
                    b"ShellId" => true,
                    b"Selector" => attribute(&e, b"Name")?.as_deref() == Some("ShellId"),
                    _ => false,
                };
            }
            Event::Text(t) if capture => {
                let id = t.unescape()?.trim().to_string();
                if !id.is_empty() {
                    return Ok(id);
                }
            }
            Event::End(_) => capture = false,
            Event::Eof => break,
            _ => {}
        }
    }

    Err(AuditError::ProtocolError("no ShellId in Create response".to_string()))
}

/// Extract the command id from a Command response
pub fn parse_command_id(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut capture = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => capture = e.local_name().as_ref() == b"CommandId",
            Event::Text(t) if capture => return Ok(t.unescape()?.trim().to_string()),
            Event::End(_) => capture = false,
            Event::Eof => break,
            _ => {}
        }
    }

    Err(AuditError::ProtocolError("no CommandId in Command response".to_string()))
}

/// Decode stream chunks and completion state from a Receive response
pub fn parse_receive(xml: &str) -> Result<ReceiveChunk> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut chunk = ReceiveChunk::default();
    let mut stream: Option<String> = None;
    let mut in_exit_code = false;
    let mut saw_envelope = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Envelope" => saw_envelope = true,
                b"Stream" => stream = attribute(&e, b"Name")?,
                b"CommandState" => chunk.done |= command_done(&e)?,
                b"ExitCode" => in_exit_code = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"CommandState" => chunk.done |= command_done(&e)?,
                // Empty streams carry an End attribute only
                _ => {}
            },
            Event::Text(t) => {
                let text = t.unescape()?;
                if in_exit_code {
                    let code = text.trim().parse::<i64>().map_err(|_| {
                        AuditError::ProtocolError(format!("invalid exit code '{}'", text.trim()))
                    })?;
                    // Windows reports NTSTATUS-style codes as unsigned 32-bit
                    chunk.exit_code = Some(code as i32);
                } else if let Some(name) = stream.as_deref() {
                    let bytes = STANDARD.decode(text.trim().as_bytes()).map_err(|e| {
                        AuditError::ProtocolError(format!("invalid base64 in {} stream: {}", name, e))
                    })?;
                    match name {
                        "stdout" => chunk.stdout.extend_from_slice(&bytes),
                        "stderr" => chunk.stderr.extend_from_slice(&bytes),
                        _ => {}
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"Stream" => stream = None,
                b"ExitCode" => in_exit_code = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_envelope {
        return Err(AuditError::ProtocolError("Receive response is not a SOAP envelope".to_string()));
    }

    Ok(chunk)
}

fn command_done(e: &BytesStart<'_>) -> Result<bool> {
    Ok(attribute(e, b"State")?.map_or(false, |s| s.ends_with(STATE_DONE_SUFFIX)))
}

/// Extract a SOAP fault, if the document contains one
pub fn parse_fault(xml: &str) -> Option<Fault> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut in_fault = false;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut codes: Vec<String> = Vec::new();
    let mut reason: Option<String> = None;
    let mut message: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"Fault" {
                    in_fault = true;
                }
                path.push(local);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some(b"Fault".as_slice()) {
                    in_fault = false;
                }
            }
            Ok(Event::Text(t)) if in_fault => {
                let text = match t.unescape() {
                    Ok(text) => text.trim().to_string(),
                    Err(_) => continue,
                };
                if text.is_empty() {
                    continue;
                }
                match path.last().map(Vec::as_slice) {
                    Some(b"Value") => codes.push(text),
                    Some(b"Text") if reason.is_none() => reason = Some(text),
                    Some(b"Message") if message.is_none() => message = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    if codes.is_empty() && reason.is_none() && message.is_none() {
        return None;
    }

    Some(Fault {
        // Innermost subcode is the most specific
        code: codes.pop(),
        reason: message.or(reason).unwrap_or_else(|| "unspecified fault".to_string()),
    })
}
