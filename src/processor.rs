//! Processing of a single video file: scan, encode, verify and replace.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::discovery::VideoFile;
use crate::error::{FileError, RunError, Stage};
use crate::events::EventSink;
use crate::profile::{EncodeProfile, display_command};
use crate::runner::{RunOutput, SubprocessRunner};
use crate::state::BatchState;
use crate::stats::ConversionStats;

/// Number of trailing encoder output lines included in error logs.
const OUTPUT_TAIL_LINES: usize = 20;

/// Reasons why a file was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Output file already exists
    OutputExists { path: PathBuf },
    /// Input already has the target extension, so the output path is the input itself
    InputIsOutput { path: PathBuf },
}

/// Result of processing a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Output verified and the original removed
    Transcoded { output: PathBuf, stats: ConversionStats },
    /// Output verified but the original could not be removed
    TranscodedWithDeleteWarning {
        output: PathBuf,
        stats: ConversionStats,
        error: String,
    },
    Skipped(SkipReason),
    /// Commands were only printed
    DryRun,
    Failed(FileError),
    /// Stop was requested while the file was being processed
    Cancelled,
}

/// What the batch should do after a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    AbortBatch,
}

/// The in-flight encode of one file.
#[derive(Debug)]
struct EncodeJob<'f> {
    input: &'f Path,
    output: &'f Path,
    started: Instant,
}

/// Runs the per-file state machine and reports every step as events.
pub struct FileProcessor<'a> {
    settings: &'a Settings,
    state: &'a BatchState,
    events: &'a EventSink,
}

impl FileOutcome {
    #[must_use]
    pub const fn decision(&self) -> Decision {
        match self {
            Self::Cancelled => Decision::AbortBatch,
            _ => Decision::Continue,
        }
    }

    /// True when a verified output was produced.
    #[must_use]
    pub const fn is_transcoded(&self) -> bool {
        matches!(self, Self::Transcoded { .. } | Self::TranscodedWithDeleteWarning { .. })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputExists { path } => {
                write!(f, "Output file already exists: {}", path.display())
            }
            Self::InputIsOutput { path } => {
                write!(f, "Input is already the output file: {}", path.display())
            }
        }
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transcoded { output, stats } => write!(f, "Transcoded to {}: {stats}", output.display()),
            Self::TranscodedWithDeleteWarning { output, error, .. } => {
                write!(f, "Transcoded to {}, original kept: {error}", output.display())
            }
            Self::Skipped(reason) => write!(f, "Skipped: {reason}"),
            Self::DryRun => write!(f, "Dry run"),
            Self::Failed(error) => write!(f, "Failed: {error}"),
            Self::Cancelled => write!(f, "Stopped by user"),
        }
    }
}

impl<'f> EncodeJob<'f> {
    fn new(file: &'f VideoFile) -> Self {
        Self {
            input: file.path(),
            output: file.output_path(),
            started: Instant::now(),
        }
    }
}

impl<'a> FileProcessor<'a> {
    #[must_use]
    pub const fn new(settings: &'a Settings, state: &'a BatchState, events: &'a EventSink) -> Self {
        Self {
            settings,
            state,
            events,
        }
    }

    /// Process one file. Never fails: every problem ends up in the returned outcome.
    pub fn process(&self, file: &VideoFile) -> FileOutcome {
        if self.state.is_stop_requested() {
            return self.cancelled(None);
        }

        let settings = self.settings;
        if !settings.handbrake.is_file() {
            return self.fail(FileError::ToolMissing(settings.handbrake.clone()), None);
        }
        if !file.path().is_file() {
            return self.fail(FileError::FileMissing(file.path().to_path_buf()), None);
        }

        if file.is_own_output() {
            let reason = SkipReason::InputIsOutput {
                path: file.path().to_path_buf(),
            };
            self.events.warning(format!("Skipping {file}: {reason}"));
            return FileOutcome::Skipped(reason);
        }

        let output = file.output_path();
        if output.exists() && !settings.overwrite {
            let reason = SkipReason::OutputExists {
                path: output.to_path_buf(),
            };
            self.events.warning(format!("Skipping {file}: {reason}"));
            return FileOutcome::Skipped(reason);
        }

        let scan_args = EncodeProfile::scan_args(file.path());
        let encode_args = settings.profile.encode_args(file.path(), output);
        if settings.dry_run {
            self.events
                .info(format!("[DRYRUN] {}", display_command(&settings.handbrake, &scan_args)));
            self.events
                .info(format!("[DRYRUN] {}", display_command(&settings.handbrake, &encode_args)));
            return FileOutcome::DryRun;
        }

        let runner = SubprocessRunner::new(self.state, settings.poll_interval);

        match runner.run(&settings.handbrake, &scan_args, settings.scan_timeout) {
            Ok(scan) if scan.success() => {}
            Ok(scan) => {
                self.log_output("STDERR", &scan.stderr);
                return self.fail(
                    FileError::ScanFailed {
                        path: file.path().to_path_buf(),
                        reason: exit_reason(&scan),
                    },
                    None,
                );
            }
            Err(error) => return self.handle_run_error(error, file.path(), Stage::Scan, None),
        }

        self.encode(&runner, file, &encode_args)
    }

    /// Encode a scanned file, then verify the output and replace the original.
    fn encode(&self, runner: &SubprocessRunner<'_>, file: &VideoFile, encode_args: &[OsString]) -> FileOutcome {
        if self.state.is_stop_requested() {
            return self.cancelled(None);
        }

        let settings = self.settings;
        let job = EncodeJob::new(file);
        self.events.info(format!("Processing: {}", job.input.display()));
        let original_size = fs::metadata(job.input).map(|m| m.len()).unwrap_or(0);

        match runner.run(&settings.handbrake, encode_args, settings.encode_timeout) {
            Ok(encode) if encode.success() => {}
            Ok(encode) => {
                self.log_output("STDERR", &encode.stderr);
                self.log_output("STDOUT", &encode.stdout);
                return self.fail(
                    FileError::EncodeFailed {
                        path: job.input.to_path_buf(),
                        reason: exit_reason(&encode),
                    },
                    Some(job.output),
                );
            }
            Err(error) => return self.handle_run_error(error, job.input, Stage::Encode, Some(job.output)),
        }

        self.finish(&job, original_size)
    }

    /// Verify the encoder output and remove the original.
    fn finish(&self, job: &EncodeJob<'_>, original_size: u64) -> FileOutcome {
        if self.state.is_stop_requested() {
            return self.cancelled(Some(job.output));
        }

        let converted_size = fs::metadata(job.output).map(|m| m.len()).unwrap_or(0);
        if converted_size == 0 {
            return self.fail(FileError::OutputInvalid(job.output.to_path_buf()), Some(job.output));
        }

        self.events.success(format!(
            "Finished: {} in {}",
            job.output.display(),
            crate::format_duration(job.started.elapsed())
        ));

        let stats = ConversionStats::new(original_size, converted_size);
        match self.delete_original(job.input) {
            Ok(()) => FileOutcome::Transcoded {
                output: job.output.to_path_buf(),
                stats,
            },
            Err(error) => {
                let error = format!("{error:#}");
                self.events.error(format!(
                    "Failed to delete original file {}: {error}",
                    job.input.display()
                ));
                FileOutcome::TranscodedWithDeleteWarning {
                    output: job.output.to_path_buf(),
                    stats,
                    error,
                }
            }
        }
    }

    /// Convert a runner error into a per-file outcome.
    fn handle_run_error(&self, error: RunError, input: &Path, stage: Stage, output: Option<&Path>) -> FileOutcome {
        match error {
            RunError::ToolNotFound(path) => self.fail(FileError::ToolMissing(path), output),
            RunError::Cancelled { .. } => self.cancelled(output),
            RunError::Timeout { stderr, .. } => {
                self.log_output("STDERR", &stderr);
                let limit = match stage {
                    Stage::Scan => self.settings.scan_timeout,
                    Stage::Encode => self.settings.encode_timeout,
                };
                self.fail(
                    FileError::Timeout {
                        path: input.to_path_buf(),
                        stage,
                        limit,
                    },
                    output,
                )
            }
            error @ (RunError::Spawn { .. } | RunError::Wait { .. }) => {
                let path = input.to_path_buf();
                let reason = error.to_string();
                let error = match stage {
                    Stage::Scan => FileError::ScanFailed { path, reason },
                    Stage::Encode => FileError::EncodeFailed { path, reason },
                };
                self.fail(error, output)
            }
        }
    }

    /// Log the error with an alert and remove any partial output.
    fn fail(&self, error: FileError, output: Option<&Path>) -> FileOutcome {
        self.events.error(error.to_string());
        if let Some(output) = output {
            self.remove_partial_output(output);
        }
        FileOutcome::Failed(error)
    }

    fn cancelled(&self, output: Option<&Path>) -> FileOutcome {
        self.events.warning("Transcoding stopped by user");
        if let Some(output) = output {
            self.remove_partial_output(output);
        }
        FileOutcome::Cancelled
    }

    fn remove_partial_output(&self, output: &Path) {
        if output.exists()
            && let Err(error) = fs::remove_file(output)
        {
            self.events.error(format!(
                "Failed to remove partial output {}: {error}",
                output.display()
            ));
        }
    }

    /// Log the last lines of captured encoder output, if there is any.
    fn log_output(&self, name: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let lines: Vec<&str> = text.lines().collect();
        let tail = lines[lines.len().saturating_sub(OUTPUT_TAIL_LINES)..].join("\n");
        self.events.info(format!("{name}: {tail}"));
    }

    /// Remove the original file, retrying a few times before giving up.
    fn delete_original(&self, path: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.remove_original(path) {
                Ok(()) => return Ok(()),
                Err(error) if attempt < self.settings.delete_retries && path.exists() => {
                    attempt += 1;
                    self.events.warning(format!(
                        "Delete failed ({error:#}), retrying {attempt}/{}",
                        self.settings.delete_retries
                    ));
                    thread::sleep(self.settings.delete_retry_delay);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn remove_original(&self, path: &Path) -> Result<()> {
        // Trash doesn't work on network drives
        if self.settings.trash && !crate::is_network_path(path) {
            if self.settings.verbose {
                self.events.info(format!("Trashing: {}", path.display()));
            }
            trash::delete(path).context("Failed to move original file to trash")?;
        } else {
            if self.settings.verbose {
                self.events.info(format!("Deleting: {}", path.display()));
            }
            fs::remove_file(path).context("Failed to delete original file")?;
        }
        Ok(())
    }
}

/// Describe how a process ended.
fn exit_reason(output: &RunOutput) -> String {
    output
        .exit_code
        .map_or_else(|| "terminated by signal".to_string(), |code| format!("exit code {code}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crossbeam_channel::Receiver;
    use tempfile::tempdir;

    use crate::events::{BatchEvent, Severity};

    fn collect_logs(receiver: &Receiver<BatchEvent>) -> Vec<(Severity, String)> {
        receiver
            .try_iter()
            .filter_map(|event| match event {
                BatchEvent::Log(log) => Some((log.severity, log.message)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn cancelled_outcome_aborts_batch() {
        assert_eq!(FileOutcome::Cancelled.decision(), Decision::AbortBatch);
        assert_eq!(
            FileOutcome::Failed(FileError::OutputInvalid(PathBuf::from("a.mp4"))).decision(),
            Decision::Continue
        );
        assert_eq!(FileOutcome::DryRun.decision(), Decision::Continue);
    }

    #[test]
    fn missing_tool_fails_file_with_alert() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("movie.mkv");
        fs::write(&input, b"video").unwrap();

        let settings = Settings {
            handbrake: dir.path().join("HandBrakeCLI"),
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        let outcome = processor.process(&VideoFile::new(&input, "mp4"));
        assert!(matches!(outcome, FileOutcome::Failed(FileError::ToolMissing(_))));
        assert!(input.exists());
        assert!(receiver.try_iter().any(|e| matches!(e, BatchEvent::Alert)));
    }

    #[test]
    fn missing_input_fails_file() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();

        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        let missing = dir.path().join("gone.avi");
        let outcome = processor.process(&VideoFile::new(&missing, "mp4"));
        assert_eq!(outcome, FileOutcome::Failed(FileError::FileMissing(missing)));
        let logs = collect_logs(&receiver);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, Severity::Error);
    }

    #[test]
    fn existing_output_is_skipped_without_alert() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        let input = dir.path().join("movie.mkv");
        fs::write(&input, b"video").unwrap();
        fs::write(dir.path().join("movie.mp4"), b"earlier").unwrap();

        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        let outcome = processor.process(&VideoFile::new(&input, "mp4"));
        assert!(matches!(outcome, FileOutcome::Skipped(SkipReason::OutputExists { .. })));
        assert!(input.exists());
        assert!(!receiver.try_iter().any(|e| matches!(e, BatchEvent::Alert)));
    }

    #[test]
    fn dry_run_prints_commands_and_changes_nothing() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        let input = dir.path().join("clip.mov");
        fs::write(&input, b"video").unwrap();

        let settings = Settings {
            handbrake: tool,
            dry_run: true,
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        let outcome = processor.process(&VideoFile::new(&input, "mp4"));
        assert_eq!(outcome, FileOutcome::DryRun);
        assert!(input.exists());
        assert!(!dir.path().join("clip.mp4").exists());

        let logs = collect_logs(&receiver);
        assert_eq!(logs.len(), 2);
        assert!(logs[0].1.ends_with("--scan"));
        assert!(logs[1].1.contains("--encoder x265_10bit"));
    }

    #[test]
    fn stop_before_start_cancels() {
        let settings = Settings::default();
        let state = BatchState::new();
        state.request_stop();
        let (events, _receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);
        let outcome = processor.process(&VideoFile::new(Path::new("whatever.mkv"), "mp4"));
        assert_eq!(outcome, FileOutcome::Cancelled);
    }

    #[test]
    fn input_with_target_extension_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        let input = dir.path().join("keep.MP4");
        fs::write(&input, b"precious").unwrap();

        // Not normalized, so nothing upstream removed the target extension
        let settings = Settings {
            handbrake: tool,
            extensions: vec!["mkv".to_string(), "mp4".to_string()],
            overwrite: true,
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        let outcome = processor.process(&VideoFile::new(&input, "mp4"));
        assert!(matches!(outcome, FileOutcome::Skipped(SkipReason::InputIsOutput { .. })));
        assert!(!outcome.is_transcoded());
        assert_eq!(fs::read_to_string(&input).unwrap(), "precious");

        let logs = collect_logs(&receiver);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, Severity::Warning);
    }

    #[test]
    fn stop_after_scan_skips_encode() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        let input = dir.path().join("movie.mkv");
        fs::write(&input, b"video").unwrap();

        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);
        let runner = SubprocessRunner::new(&state, settings.poll_interval);
        let file = VideoFile::new(&input, "mp4");
        let args = settings.profile.encode_args(file.path(), file.output_path());

        state.request_stop();
        assert_eq!(processor.encode(&runner, &file, &args), FileOutcome::Cancelled);
        assert!(input.exists());

        let logs = collect_logs(&receiver);
        assert!(!logs.iter().any(|(_, message)| message.starts_with("Processing:")));
        assert_eq!(logs, [(Severity::Warning, "Transcoding stopped by user".to_string())]);
    }

    #[test]
    fn stop_after_encode_discards_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("movie.mkv");
        fs::write(&input, b"video").unwrap();
        let file = VideoFile::new(&input, "mp4");
        fs::write(file.output_path(), b"finished encode").unwrap();

        let settings = Settings::default();
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        state.request_stop();
        let outcome = processor.finish(&EncodeJob::new(&file), 5);
        assert_eq!(outcome, FileOutcome::Cancelled);
        assert_eq!(outcome.decision(), Decision::AbortBatch);
        assert!(input.exists());
        assert!(!file.output_path().exists());
        assert!(!receiver.try_iter().any(|e| matches!(e, BatchEvent::Alert)));
    }

    #[test]
    fn finish_verifies_and_replaces_original() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("movie.mkv");
        fs::write(&input, b"original video").unwrap();
        let file = VideoFile::new(&input, "mp4");
        fs::write(file.output_path(), b"smaller").unwrap();

        let settings = Settings::default();
        let state = BatchState::new();
        let (events, _receiver) = EventSink::channel();
        let processor = FileProcessor::new(&settings, &state, &events);

        let outcome = processor.finish(&EncodeJob::new(&file), 14);
        assert_eq!(
            outcome,
            FileOutcome::Transcoded {
                output: file.output_path().to_path_buf(),
                stats: ConversionStats::new(14, 7),
            }
        );
        assert!(!input.exists());
    }

    #[test]
    fn exit_reason_describes_signal() {
        let output = RunOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(exit_reason(&output), "terminated by signal");
        assert_eq!(
            exit_reason(&RunOutput {
                exit_code: Some(3),
                ..output
            }),
            "exit code 3"
        );
    }
}
