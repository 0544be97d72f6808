//! Error types for ts3query

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to ServerQuery communication
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection lost")]
    ConnectionLost,

    #[error("unexpected greeting: {0}")]
    Greeting(String),

    /// Non-zero status line returned by the server
    #[error("error({code}) {message}{}", format_extra(.extra))]
    Protocol {
        code: u32,
        message: String,
        extra: Option<String>,
    },

    #[error("command error: {0}")]
    Command(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Whether the connection must be discarded after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, QueryError::Protocol { .. } | QueryError::Command(_))
    }
}

/// Errors raised while setting up a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("cannot select server: {0}")]
    SelectFailed(String),

    #[error("missing field {0} in server response")]
    MissingField(&'static str),

    #[error(transparent)]
    Query(#[from] QueryError),
}

fn format_extra(extra: &Option<String>) -> String {
    extra
        .as_deref()
        .map(|e| format!(" ({e})"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
