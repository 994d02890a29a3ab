//! Batch controller: runs the per-file processor over every discovered file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::config::Settings;
use crate::discovery::discover_files;
use crate::error::{BatchError, DiscoveryError};
use crate::events::{BatchEvent, EventSink};
use crate::processor::{Decision, FileProcessor};
use crate::state::{BatchState, StopHandle};
use crate::stats::RunStats;

/// What a finished batch reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Files that were handled, successfully or not.
    pub processed: usize,
    pub total: usize,
    /// True when the user stopped the batch.
    pub aborted: bool,
    /// Setup failure that ended the batch early.
    pub error: Option<BatchError>,
    pub stats: RunStats,
}

/// Runs all files of one directory through the processor, one at a time.
pub struct TranscodeBatch {
    settings: Settings,
    state: Arc<BatchState>,
    events: EventSink,
}

/// A batch running on a worker thread.
pub struct BatchHandle {
    events: Receiver<BatchEvent>,
    stop: StopHandle,
    worker: JoinHandle<BatchSummary>,
}

impl BatchSummary {
    /// True when every file was visited without a stop or a setup failure.
    #[must_use]
    pub const fn completed(&self) -> bool {
        !self.aborted && self.error.is_none()
    }
}

impl TranscodeBatch {
    #[must_use]
    pub const fn new(settings: Settings, state: Arc<BatchState>, events: EventSink) -> Self {
        Self {
            settings,
            state,
            events,
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.state))
    }

    /// Run the whole batch for `root` and return the summary.
    ///
    /// Any subprocess still registered when the batch ends is terminated.
    pub fn run(&self, root: &Path) -> BatchSummary {
        let summary = self.run_files(root);
        let leftover = self.state.registry().terminate_all();
        if leftover > 0 {
            self.events
                .warning(format!("Terminated {leftover} leftover HandBrake process(es)"));
        }
        summary
    }

    fn run_files(&self, root: &Path) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let settings = &self.settings;

        if !settings.handbrake.is_file() {
            let error = BatchError::ToolNotFound(settings.handbrake.clone());
            self.events
                .error(format!("{error}. Please ensure it is installed."));
            summary.error = Some(error);
            return summary;
        }

        self.events
            .info(format!("Starting transcoding for directory: {}", root.display()));

        let files = match discover_files(root, &settings.extensions, &settings.target_extension) {
            Ok(files) => files,
            Err(DiscoveryError::NotFound(path)) => {
                let error = BatchError::DirectoryNotFound(path);
                self.events.error(error.to_string());
                summary.error = Some(error);
                return summary;
            }
        };

        let total = files.len();
        self.state.set_total(total);
        summary.total = total;
        if total == 0 {
            let error = BatchError::NoFilesFound(root.to_path_buf());
            self.events.error(error.to_string());
            summary.error = Some(error);
            return summary;
        }
        self.events.info(format!("Found {total} video files to process."));

        let processor = FileProcessor::new(settings, &self.state, &self.events);
        for (index, file) in files.iter().enumerate() {
            if self.state.is_stop_requested() {
                self.events.warning("Transcoding stopped by user");
                break;
            }

            self.events.send(BatchEvent::FileStarted {
                index: index + 1,
                total,
                path: file.path().to_path_buf(),
            });

            let start = Instant::now();
            let outcome = processor.process(file);
            summary.stats.add_result(&outcome, start.elapsed());

            let decision = outcome.decision();
            self.events.send(BatchEvent::FileFinished {
                path: file.path().to_path_buf(),
                outcome,
            });
            if decision == Decision::AbortBatch {
                break;
            }

            let current = self.state.advance();
            self.events.progress(current, total);
        }

        summary.processed = self.state.completed();
        summary.aborted = self.state.is_stop_requested();
        if !summary.aborted {
            self.events.success("🎉 All files processed!");
            self.events.send(BatchEvent::Celebration);
        }
        summary
    }
}

/// Start a batch for `root` on a dedicated worker thread.
pub fn spawn_batch(settings: Settings, root: PathBuf) -> io::Result<BatchHandle> {
    spawn_batch_with_state(settings, root, BatchState::new())
}

/// Start a batch that uses existing shared state.
///
/// Lets the caller hand out a [`StopHandle`] before the worker starts.
pub fn spawn_batch_with_state(settings: Settings, root: PathBuf, state: Arc<BatchState>) -> io::Result<BatchHandle> {
    let (events, receiver) = EventSink::channel();
    let batch = TranscodeBatch::new(settings, state, events);
    let stop = batch.stop_handle();
    let worker = thread::Builder::new()
        .name("transcode-worker".to_string())
        .spawn(move || batch.run(&root))?;

    Ok(BatchHandle {
        events: receiver,
        stop,
        worker,
    })
}

impl BatchHandle {
    /// Ordered event stream. Ends when the worker has finished.
    #[must_use]
    pub const fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Wait for the worker to finish and return its summary.
    pub fn join(self) -> BatchSummary {
        let stop = self.stop;
        self.worker.join().unwrap_or_else(|_| {
            // The worker panicked, make sure nothing it started keeps running
            stop.request_stop();
            let (processed, total) = stop.progress();
            BatchSummary {
                processed,
                total,
                aborted: true,
                ..BatchSummary::default()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::tempdir;

    use crate::events::Severity;

    fn messages(receiver: &Receiver<BatchEvent>) -> Vec<String> {
        receiver
            .try_iter()
            .filter_map(|event| match event {
                BatchEvent::Log(log) => Some(log.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn missing_tool_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mkv"), b"video").unwrap();
        let settings = Settings {
            handbrake: dir.path().join("no-handbrake"),
            ..Settings::default()
        };
        let (events, receiver) = EventSink::channel();
        let batch = TranscodeBatch::new(settings, BatchState::new(), events);

        let summary = batch.run(dir.path());
        assert_eq!(summary.processed, 0);
        assert!(matches!(summary.error, Some(BatchError::ToolNotFound(_))));
        assert!(!summary.completed());
        let logs = messages(&receiver);
        assert_eq!(logs.len(), 1);
        assert_eq!(Severity::from_line(&logs[0]), Some(Severity::Error));
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };
        let (events, _receiver) = EventSink::channel();
        let batch = TranscodeBatch::new(settings, BatchState::new(), events);

        let missing = dir.path().join("nope");
        let summary = batch.run(&missing);
        assert_eq!(summary.error, Some(BatchError::DirectoryNotFound(missing)));
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn empty_directory_reports_no_files() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        let media = dir.path().join("media");
        fs::create_dir(&media).unwrap();
        fs::write(media.join("notes.txt"), b"text").unwrap();

        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };
        let state = BatchState::new();
        let (events, receiver) = EventSink::channel();
        let batch = TranscodeBatch::new(settings, Arc::clone(&state), events);

        let summary = batch.run(&media);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.error, Some(BatchError::NoFilesFound(media)));
        assert_eq!(state.registry().high_water_mark(), 0);

        let events: Vec<BatchEvent> = receiver.try_iter().collect();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, BatchEvent::Log(log) if log.message.starts_with("No video files found")))
        );
        assert!(events.iter().any(|e| matches!(e, BatchEvent::Alert)));
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::Celebration)));
    }

    #[test]
    fn stop_before_run_aborts_without_processing() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        fs::write(dir.path().join("a.mkv"), b"video").unwrap();
        fs::write(dir.path().join("b.avi"), b"video").unwrap();

        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };
        let (events, receiver) = EventSink::channel();
        let batch = TranscodeBatch::new(settings, BatchState::new(), events);
        batch.stop_handle().request_stop();

        let summary = batch.run(dir.path());
        assert!(summary.aborted);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.total, 2);
        assert!(messages(&receiver).iter().any(|m| m.contains("stopped by user")));
    }

    #[test]
    fn dry_run_visits_every_file() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        for name in ["a.mkv", "b.avi", "sub/c.wmv"] {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"video").unwrap();
        }

        let settings = Settings {
            handbrake: tool,
            dry_run: true,
            ..Settings::default()
        };
        let (events, receiver) = EventSink::channel();
        let batch = TranscodeBatch::new(settings, BatchState::new(), events);

        let summary = batch.run(dir.path());
        assert!(summary.completed());
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.stats.files_dry_run, 3);

        let progress: Vec<(usize, usize)> = receiver
            .try_iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { current, total } => Some((current, total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, [(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn stop_handle_created_before_spawn_stops_worker() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("HandBrakeCLI");
        fs::write(&tool, b"").unwrap();
        fs::write(dir.path().join("a.mkv"), b"video").unwrap();
        fs::write(dir.path().join("b.mkv"), b"video").unwrap();
        let settings = Settings {
            handbrake: tool,
            ..Settings::default()
        };

        let state = BatchState::new();
        let stop = StopHandle::new(Arc::clone(&state));
        stop.request_stop();

        let handle = spawn_batch_with_state(settings, dir.path().to_path_buf(), state).unwrap();
        let events: Vec<BatchEvent> = handle.events().iter().collect();
        let summary = handle.join();

        assert!(summary.aborted);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.total, 2);
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::FileStarted { .. })));
        assert!(dir.path().join("a.mkv").exists());
    }
}
