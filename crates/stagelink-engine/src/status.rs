//! User-facing operator status
//!
//! Operators never return errors to the evaluation side. Problems are
//! described through a [`StatusSink`] as `(message, severity)` and the
//! operator carries on.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Receives status changes from operators
pub trait StatusSink: Send + Sync {
    fn report(&self, operator: &str, message: &str, severity: Severity);
}

/// Forwards status to `tracing` at the matching level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn report(&self, operator: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(operator, "{}", message),
            Severity::Warning => warn!(operator, "{}", message),
            Severity::Error => error!(operator, "{}", message),
        }
    }
}

/// A reported status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub operator: String,
    pub message: String,
    pub severity: Severity,
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct StatusLog {
    entries: Mutex<Vec<StatusEntry>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatusEntry> {
        self.entries.lock().clone()
    }

    pub fn last(&self) -> Option<StatusEntry> {
        self.entries.lock().last().cloned()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.lock().iter().filter(|e| e.severity == severity).count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl StatusSink for StatusLog {
    fn report(&self, operator: &str, message: &str, severity: Severity) {
        self.entries.lock().push(StatusEntry {
            operator: operator.to_string(),
            message: message.to_string(),
            severity,
        });
    }
}

/// Per-operator status that only reaches the sink when it changes
pub struct StatusReporter {
    operator: String,
    sink: Arc<dyn StatusSink>,
    current: Option<(String, Severity)>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("operator", &self.operator)
            .field("current", &self.current)
            .finish()
    }
}

impl StatusReporter {
    pub fn new(operator: impl Into<String>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            operator: operator.into(),
            sink,
            current: None,
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Current status, `None` while healthy and silent
    pub fn current(&self) -> Option<(&str, Severity)> {
        self.current.as_ref().map(|(m, s)| (m.as_str(), *s))
    }

    pub fn set(&mut self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        let unchanged = matches!(&self.current, Some((m, s)) if *m == message && *s == severity);
        if unchanged {
            return;
        }
        self.sink.report(&self.operator, &message, severity);
        self.current = Some((message, severity));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.set(message, Severity::Info);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.set(message, Severity::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.set(message, Severity::Error);
    }

    /// Return to healthy; the next problem is reported again
    pub fn clear(&mut self) {
        self.current = None;
    }
}
