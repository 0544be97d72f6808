//! Diagnostic log handed to the query client at construction

use parking_lot::Mutex;
use tracing::debug;

/// Collects diagnostic messages when enabled
///
/// Messages are always forwarded to `tracing`; they are only retained for
/// [`DebugLog::entries`] when the log is enabled.
#[derive(Debug, Default)]
pub struct DebugLog {
    enabled: bool,
    entries: Mutex<Vec<String>>,
}

impl DebugLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a message; returns whether it was retained
    pub fn record(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        debug!("{}", message);
        if self.enabled {
            self.entries.lock().push(message);
        }
        self.enabled
    }

    /// Snapshot of retained messages
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}
