//! Command construction
//!
//! Builds `verb key=value ... -flag` lines with every value escaped.

use std::fmt;

use super::codec::escape;

/// Verb that ends the query session
pub const QUIT: &str = "quit";

/// A command ready to be sent to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    params: Vec<(String, Option<String>)>,
    flags: Vec<String>,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            params: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Add a parameter; the value is escaped when the command is rendered
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), Some(value.to_string())));
        self
    }

    /// Add a parameter that is omitted from the wire when `None`
    pub fn opt_param<V: ToString>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.params
            .push((name.into(), value.map(|v| v.to_string())));
        self
    }

    /// Add a trailing `-name` option
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.flags.push(name.into());
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Render the command line (without terminator)
    pub fn to_wire(&self) -> String {
        let mut line = self.verb.trim().to_string();
        for (name, value) in &self.params {
            if let Some(value) = value {
                line.push(' ');
                line.push_str(name);
                line.push('=');
                line.push_str(&escape(value));
            }
        }
        for flag in &self.flags {
            line.push_str(" -");
            line.push_str(flag);
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<&str> for Command {
    fn from(verb: &str) -> Self {
        Command::new(verb)
    }
}
