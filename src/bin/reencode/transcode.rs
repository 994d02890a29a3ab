use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use reencode::batch::{BatchSummary, spawn_batch_with_state};
use reencode::events::{BatchEvent, LogEvent, Severity};
use reencode::processor::FileOutcome;
use reencode::state::{BatchState, StopHandle};

use crate::config::Config;
use crate::logger::FileLogger;

const PROGRESS_BAR_CHARS: &str = "=>-";
const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:60.magenta/blue} {pos}/{len} {percent}% {msg}";

/// Exit code used when the user stops the run with Ctrl+C.
const EXIT_ABORTED: u8 = 130;

/// Terminal front end: runs a batch on a worker thread and renders its events.
pub struct Transcode {
    config: Config,
    logger: FileLogger,
    progress_bar: Option<ProgressBar>,
}

impl Transcode {
    /// Create a new front end from the combined config.
    pub fn new(config: Config) -> Result<Self> {
        let logger = FileLogger::new()?;
        Ok(Self {
            config,
            logger,
            progress_bar: None,
        })
    }

    /// Run the batch until it finishes or the user stops it.
    pub fn run(mut self) -> Result<ExitCode> {
        self.logger.log_init(&self.config);
        if self.config.settings.verbose {
            println!("{}", format!("HandBrakeCLI: {}", self.config.settings.handbrake.display()).bold());
        }

        // Ctrl+C handler must be in place before any encoder process can start
        let state = BatchState::new();
        let stop = StopHandle::new(Arc::clone(&state));
        let stop_pressed = AtomicBool::new(false);
        ctrlc::set_handler(move || {
            if stop_pressed.swap(true, Ordering::SeqCst) {
                // Second Ctrl+C - force exit
                std::process::exit(i32::from(EXIT_ABORTED));
            }
            eprintln!("\n{}", "Received Ctrl+C, stopping HandBrake...".yellow().bold());
            stop.request_stop();
        })
        .context("Failed to set Ctrl+C handler")?;

        let handle = spawn_batch_with_state(self.config.settings.clone(), self.config.path.clone(), state)
            .context("Failed to start transcode worker")?;

        for event in handle.events() {
            self.handle_event(event);
        }

        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }

        let summary = handle.join();
        self.logger.log_summary(&summary);
        if summary.aborted {
            println!("\n{}", "Aborted by user".bold().red());
        }
        if summary.total > 0 {
            summary.stats.print_summary();
        }

        Ok(exit_code(&summary))
    }

    fn handle_event(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Log(log) => {
                self.logger.log_event(&log);
                self.print(&colorize(&log));
            }
            BatchEvent::Alert => {
                if std::io::stdout().is_terminal() {
                    // Terminal bell
                    print!("\x07");
                    let _ = std::io::stdout().flush();
                }
            }
            BatchEvent::Celebration => {}
            BatchEvent::FileStarted { index, total, path } => {
                let progress_bar = self.progress_bar(total);
                progress_bar.set_message(reencode::path_to_string(path.file_name().map_or(path.as_path(), Path::new)));
                let width = total.to_string().chars().count();
                self.print(
                    &format!("[{index:>width$}/{total}] {}", reencode::path_to_string_relative(&path))
                        .bold()
                        .magenta()
                        .to_string(),
                );
            }
            BatchEvent::Progress { current, total } => {
                let progress_bar = self.progress_bar(total);
                progress_bar.set_position(current as u64);
            }
            BatchEvent::FileFinished { path, outcome } => {
                self.logger.log_result(&path, &outcome);
                if let FileOutcome::Transcoded { stats, .. } = &outcome {
                    self.print(&format!("✓ {stats}").cyan().to_string());
                }
            }
        }
    }

    /// Get the progress bar, creating it on first use.
    fn progress_bar(&mut self, total: usize) -> &ProgressBar {
        self.progress_bar.get_or_insert_with(|| {
            let progress_bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_BAR_TEMPLATE) {
                progress_bar.set_style(style.progress_chars(PROGRESS_BAR_CHARS));
            }
            progress_bar
        })
    }

    /// Print a line without breaking the progress bar.
    fn print(&self, line: &str) {
        match &self.progress_bar {
            Some(progress_bar) => progress_bar.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

fn colorize(log: &LogEvent) -> String {
    let line = log.to_string();
    match log.severity {
        Severity::Info => line,
        Severity::Success => line.green().to_string(),
        Severity::Warning => line.yellow().to_string(),
        Severity::Error => line.red().to_string(),
    }
}

fn exit_code(summary: &BatchSummary) -> ExitCode {
    if summary.aborted {
        ExitCode::from(EXIT_ABORTED)
    } else if summary.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reencode::error::BatchError;

    #[test]
    fn exit_code_distinguishes_outcomes() {
        let completed = BatchSummary {
            processed: 2,
            total: 2,
            ..BatchSummary::default()
        };
        assert_eq!(exit_code(&completed), ExitCode::SUCCESS);

        let aborted = BatchSummary {
            processed: 1,
            total: 2,
            aborted: true,
            ..BatchSummary::default()
        };
        assert_eq!(exit_code(&aborted), ExitCode::from(EXIT_ABORTED));

        let fatal = BatchSummary {
            error: Some(BatchError::ToolNotFound("HandBrakeCLI".into())),
            ..BatchSummary::default()
        };
        assert_eq!(exit_code(&fatal), ExitCode::FAILURE);
    }

    #[test]
    fn colorize_keeps_marker() {
        colored::control::set_override(false);
        let log = LogEvent::new(Severity::Warning, "Transcoding stopped by user");
        assert_eq!(colorize(&log), "⚠ Transcoding stopped by user");
    }
}
