//! Response classification and status handling
//!
//! Every line read after a command is either an asynchronous event, the
//! terminal status line, or a data line belonging to the current response.

use serde::Serialize;

use crate::error::QueryError;

use super::codec::{parse_once, parse_payload, Record, RECORD_SEPARATOR};

/// Marker expected on the first greeting line
pub const GREETING_MARKER: &str = "TS3";

/// Marker identifying asynchronous notification lines
pub const EVENT_MARKER: &str = "notify";

/// Prefix of the terminal status line
pub const STATUS_PREFIX: &str = "error id=";

/// Status code reported on success
pub const SUCCESS: u32 = 0;

/// Classification of a received line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Event,
    Status,
    Data,
}

/// Classify a line. Event detection takes precedence.
pub fn classify(line: &str) -> LineKind {
    if line.contains(EVENT_MARKER) {
        LineKind::Event
    } else if line.starts_with(STATUS_PREFIX) {
        LineKind::Status
    } else {
        LineKind::Data
    }
}

/// Strip embedded line breaks from a message
pub fn remove_line(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Parsed terminal status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Status {
    /// Parse `error id=<n> msg=<text>[ extra_msg=<text>]`
    pub fn parse(line: &str) -> Result<Self, QueryError> {
        let record = parse_once(line);
        let code = record
            .get_str("id")
            .and_then(|id| id.parse::<u32>().ok())
            .ok_or_else(|| QueryError::Malformed(format!("bad status line: {}", line)))?;
        Ok(Status {
            code,
            message: record.get_str("msg").unwrap_or_default().to_string(),
            extra: record.get_str("extra_msg").map(str::to_string),
        })
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS
    }

    /// `error(<code>) <msg>[ (<extra_msg>)]` with line breaks removed
    pub fn format_error(&self) -> String {
        let mut msg = format!("error({}) {}", self.code, remove_line(&self.message));
        if let Some(extra) = &self.extra {
            msg.push_str(&format!(" ({})", remove_line(extra)));
        }
        msg
    }

    pub fn to_error(&self) -> QueryError {
        QueryError::Protocol {
            code: self.code,
            message: remove_line(&self.message),
            extra: self.extra.as_deref().map(remove_line),
        }
    }
}

/// Data lines collected for one command, closed by its status line
#[derive(Debug, Default)]
pub struct ResponseEnvelope {
    data: Vec<String>,
}

impl ResponseEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_data(&mut self, line: String) {
        self.data.push(line);
    }

    pub fn data_lines(&self) -> &[String] {
        &self.data
    }

    /// Close the envelope with its status line
    pub fn finish(self, status: Status) -> QueryResult {
        if !status.is_success() {
            return QueryResult {
                success: false,
                message: status.format_error(),
                data: Vec::new(),
                status,
            };
        }
        let block = self.data.join(RECORD_SEPARATOR.to_string().as_str());
        QueryResult {
            success: true,
            message: remove_line(&status.message),
            data: parse_payload(&block),
            status,
        }
    }
}

/// Outcome of one executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub success: bool,
    pub message: String,
    pub data: Vec<Record>,
    #[serde(skip)]
    pub status: Status,
}

impl QueryResult {
    /// First record of the data, for single-row commands
    pub fn first(&self) -> Option<&Record> {
        self.data.first()
    }

    /// Records on success, the status as a [`QueryError::Protocol`] otherwise
    pub fn into_records(self) -> Result<Vec<Record>, QueryError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.status.to_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("error id=0 msg=ok"), LineKind::Status);
        assert_eq!(
            classify("notifycliententerview cfid=0 ctid=1 clid=5"),
            LineKind::Event
        );
        assert_eq!(classify("version=3.13.7 build=1"), LineKind::Data);
        assert_eq!(classify("msg=error id= mentioned"), LineKind::Data);
    }

    #[test]
    fn test_status_parse() {
        let status = Status::parse("error id=1281 msg=invalid\\sparameter").unwrap();
        assert_eq!(status.code, 1281);
        assert_eq!(status.message, "invalid parameter");
        assert_eq!(status.extra, None);
        assert!(!status.is_success());
        assert_eq!(status.format_error(), "error(1281) invalid parameter");
    }

    #[test]
    fn test_status_with_extra_message() {
        let status =
            Status::parse("error id=2568 msg=insufficient\\sclient\\spermissions extra_msg=need\\smore")
                .unwrap();
        assert_eq!(
            status.format_error(),
            "error(2568) insufficient client permissions (need more)"
        );
    }

    #[test]
    fn test_status_malformed() {
        let err = Status::parse("error id=abc msg=ok").unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[test]
    fn test_envelope_success_empty() {
        let result = ResponseEnvelope::new().finish(Status::parse("error id=0 msg=ok").unwrap());
        assert!(result.success);
        assert_eq!(result.message, "ok");
        assert!(result.data.is_empty());
    }

    #[test]
    fn test_envelope_failure_voids_data() {
        let mut envelope = ResponseEnvelope::new();
        envelope.push_data("a=1".to_string());
        let result = envelope.finish(Status::parse("error id=1024 msg=invalid\\sserverID").unwrap());
        assert!(!result.success);
        assert!(result.data.is_empty());
        assert!(result.message.contains("(1024)"));
        assert!(result.message.contains("invalid serverID"));

        let err = result.into_records().unwrap_err();
        assert!(matches!(err, QueryError::Protocol { code: 1024, .. }));
    }

    #[test]
    fn test_envelope_joins_data_lines_as_records() {
        let mut envelope = ResponseEnvelope::new();
        envelope.push_data("cid=1".to_string());
        envelope.push_data("cid=2".to_string());
        let records = envelope
            .finish(Status::parse("error id=0 msg=ok").unwrap())
            .into_records()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_str("cid"), Some("2"));
    }
}
