//! Events sent from the batch worker to the front end.

use std::fmt;
use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender};

use crate::processor::FileOutcome;

/// Severity of a log event, shown as a leading marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// An immutable log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
}

/// Everything the worker reports, in the order it happened.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Log(LogEvent),
    /// Something went wrong. Front ends use this for an audible or visual cue.
    Alert,
    /// The batch ran to the end without being stopped.
    Celebration,
    /// Work on a file is starting. `index` is 1-based.
    FileStarted { index: usize, total: usize, path: PathBuf },
    Progress { current: usize, total: usize },
    FileFinished { path: PathBuf, outcome: FileOutcome },
}

/// Sending half of the ordered event channel.
///
/// Sending never fails from the worker's point of view:
/// if the front end has gone away, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<BatchEvent>,
}

impl Severity {
    /// Leading marker used in the textual form of a log event.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Info => "▶",
            Self::Success => "✅",
            Self::Warning => "⚠",
            Self::Error => "❌",
        }
    }

    /// Recover the severity from a marker-prefixed line.
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        [Self::Info, Self::Success, Self::Warning, Self::Error]
            .into_iter()
            .find(|severity| line.starts_with(severity.marker()))
    }
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity.marker(), self.message)
    }
}

impl EventSink {
    /// Create a sink and the receiving end of an unbounded channel.
    #[must_use]
    pub fn channel() -> (Self, Receiver<BatchEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    pub fn send(&self, event: BatchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.send(BatchEvent::Log(LogEvent::new(severity, message)));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    /// Log an error and fire an alert right after it.
    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
        self.send(BatchEvent::Alert);
    }

    pub fn progress(&self, current: usize, total: usize) {
        self.send(BatchEvent::Progress { current, total });
    }
}
