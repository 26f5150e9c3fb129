//! Pure parsing of raw remote output into record fields
//!
//! Nothing here touches the network, so every record shape can be tested
//! directly against captured output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator the event query emits between timestamp, id and message
pub const EVENT_FIELD_SEPARATOR: char = '\t';

/// Table-formatted event rows, e.g. `10/16/2026 9:14:02 AM   2003 Forwarded ...`
static TABLE_EVENT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{1,4}[/.-]\d{1,2}[/.-]\d{1,4}[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:\s?[AaPp][Mm])?(?:Z|[+-]\d{2}:?\d{2})?)\s+(?P<id>\d{1,10})\s+(?P<msg>.*)$",
    )
    .expect("event line pattern is valid")
});

/// Fields extracted from one event-log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub timestamp: String,
    pub event_id: Option<u32>,
    pub message: String,
}

/// Non-empty, trimmed lines in output order
pub fn record_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Observed identity from `whoami`-style output: the first non-empty line
pub fn parse_identity(output: &str) -> Option<String> {
    record_lines(output).first().map(|line| line.to_string())
}

/// Best-effort split of an event line into timestamp, id and message.
///
/// Lines that match no known shape are kept whole as the message.
pub fn parse_event_line(line: &str) -> ParsedEvent {
    let line = line.trim();

    if line.contains(EVENT_FIELD_SEPARATOR) {
        let mut fields = line.splitn(3, EVENT_FIELD_SEPARATOR);
        let timestamp = fields.next().unwrap_or_default().trim();
        let id = fields.next().unwrap_or_default().trim();
        let message = fields.next().unwrap_or_default().trim();

        if let Ok(event_id) = id.parse::<u32>() {
            return ParsedEvent {
                timestamp: timestamp.to_string(),
                event_id: Some(event_id),
                message: message.to_string(),
            };
        }
    }

    if let Some(caps) = TABLE_EVENT_LINE.captures(line) {
        if let Ok(event_id) = caps["id"].parse::<u32>() {
            return ParsedEvent {
                timestamp: caps["ts"].to_string(),
                event_id: Some(event_id),
                message: caps["msg"].trim().to_string(),
            };
        }
    }

    ParsedEvent {
        timestamp: String::new(),
        event_id: None,
        message: line.to_string(),
    }
}
