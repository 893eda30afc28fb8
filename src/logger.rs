//! Log sink used by the index for infrastructure failures.
//!
//! The index never writes to stdout (the language server speaks over it);
//! entries go through a [`LogSink`]. The default sink forwards to `tracing`.
//! The server wraps it to also surface alerts to the user.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub content: String,
    pub severity: Option<LogSeverity>,
    /// Message to show the user, when the entry deserves their attention
    pub alert: Option<String>,
}

impl LogEntry {
    pub fn info(content: impl Into<String>) -> LogEntry {
        LogEntry {
            content: content.into(),
            severity: Some(LogSeverity::Info),
            alert: None,
        }
    }

    pub fn warning(content: impl Into<String>) -> LogEntry {
        LogEntry {
            content: content.into(),
            severity: Some(LogSeverity::Warning),
            alert: None,
        }
    }

    pub fn error(content: impl Into<String>) -> LogEntry {
        LogEntry {
            content: content.into(),
            severity: Some(LogSeverity::Error),
            alert: None,
        }
    }

    pub fn with_alert(mut self, alert: impl Into<String>) -> LogEntry {
        self.alert = Some(alert.into());
        self
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// Forwards entries to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, entry: LogEntry) {
        match entry.severity {
            Some(LogSeverity::Error) => error!(alert = entry.alert.as_deref(), "{}", entry.content),
            Some(LogSeverity::Warning) => {
                warn!(alert = entry.alert.as_deref(), "{}", entry.content)
            }
            Some(LogSeverity::Info) | None => {
                info!(alert = entry.alert.as_deref(), "{}", entry.content)
            }
        }
    }
}

/// Keeps every entry in memory for inspection after a run.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemorySink {
    fn log(&self, entry: LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_entries_in_order() {
        let sink = MemorySink::default();
        sink.log(LogEntry::info("first"));
        sink.log(LogEntry::error("second").with_alert("Could not read file"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].severity, Some(LogSeverity::Info));
        assert_eq!(entries[1].alert.as_deref(), Some("Could not read file"));
    }
}
