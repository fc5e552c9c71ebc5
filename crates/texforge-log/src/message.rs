//! Classified diagnostic messages produced from engine output.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finalized message from the engine output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticMessage {
    /// Severity level.
    pub severity: Severity,

    /// One-line summary (wrapped continuations already merged).
    pub summary: String,

    /// Detail lines in the order they appeared.
    #[serde(default)]
    pub details: Vec<String>,

    /// File-inclusion depth active when the message began.
    pub depth: usize,
}

impl DiagnosticMessage {
    /// Create a message with no details.
    pub fn new(severity: Severity, summary: impl Into<String>, depth: usize) -> Self {
        Self {
            severity,
            summary: summary.into(),
            details: Vec::new(),
            depth,
        }
    }

    /// Error-severity message at depth zero, used for failures that did not
    /// come from the engine's own output.
    pub fn synthetic_error(summary: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary, 0)
    }

    /// Attach detail lines.
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Per-severity message tally.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageCounts {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl MessageCounts {
    pub fn tally<'a>(messages: impl IntoIterator<Item = &'a DiagnosticMessage>) -> Self {
        let mut counts = Self::default();
        for message in messages {
            match message.severity {
                Severity::Error => counts.errors += 1,
                Severity::Warning => counts.warnings += 1,
                Severity::Info => counts.infos += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.errors + self.warnings + self.infos
    }
}
