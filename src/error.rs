//! Error types for the transcoding core.
//!
//! Only [`BatchError`] ends a batch early. Per-file failures are [`FileError`]s,
//! which the processor turns into log events and a continue decision.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Setup failures that end the whole batch before any file is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("HandBrakeCLI not found at {}", .0.display())]
    ToolNotFound(PathBuf),
    #[error("Directory does not exist or is not accessible: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("No video files found in {}", .0.display())]
    NoFilesFound(PathBuf),
}

/// File discovery failure.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Directory does not exist or is not accessible: {}", .0.display())]
    NotFound(PathBuf),
}

/// Subprocess failure reported by the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Executable not found: {}", .0.display())]
    ToolNotFound(PathBuf),
    #[error("Failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for {}: {source}", .program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Process timed out after {}", display_duration(.elapsed))]
    Timeout {
        elapsed: Duration,
        stdout: String,
        stderr: String,
    },
    #[error("Process was stopped by user")]
    Cancelled { stdout: String, stderr: String },
}

/// Which encoder invocation a per-file failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Encode,
}

/// Per-file failures. The batch always continues after these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    #[error("HandBrakeCLI not found at {}", .0.display())]
    ToolMissing(PathBuf),
    #[error("File does not exist or is not accessible: {}", .0.display())]
    FileMissing(PathBuf),
    #[error("Invalid video file {}: HandBrake scan failed ({reason})", .path.display())]
    ScanFailed { path: PathBuf, reason: String },
    #[error("Error processing {}: HandBrake failed ({reason})", .path.display())]
    EncodeFailed { path: PathBuf, reason: String },
    #[error("Timeout processing {}: HandBrake {stage} took longer than {}", .path.display(), display_duration(.limit))]
    Timeout {
        path: PathBuf,
        stage: Stage,
        limit: Duration,
    },
    #[error("Output file missing or empty: {}", .0.display())]
    OutputInvalid(PathBuf),
}

fn display_duration(duration: &Duration) -> String {
    crate::format_duration(*duration)
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Encode => write!(f, "encode"),
        }
    }
}
