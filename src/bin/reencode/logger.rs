use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use reencode::batch::BatchSummary;
use reencode::events::{LogEvent, Severity};
use reencode::processor::FileOutcome;

use crate::config::Config;

/// Simple file logger for transcode runs with buffered writes
pub struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    /// Create a new file logger, writing to ~/logs/reencode/reencode_<timestamp>.log
    pub(crate) fn new() -> Result<Self> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        let log_dir = home_dir.join("logs").join(env!("CARGO_PKG_NAME"));

        // Create log directory if it doesn't exist
        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        }

        let log_path = log_dir.join(format!(
            "{}_{}.log",
            env!("CARGO_BIN_NAME"),
            Local::now().format("%Y-%m-%d_%H-%M-%S")
        ));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Log when starting the program
    pub(crate) fn log_init(&mut self, config: &Config) {
        let settings = &config.settings;
        let _ = writeln!(
            self.writer,
            "[{}] INIT \"{}\"",
            Self::timestamp(),
            config.path.display()
        );
        let _ = writeln!(self.writer, "  handbrake: {}", settings.handbrake.display());
        let _ = writeln!(self.writer, "  extensions: {:?}", settings.extensions);
        let _ = writeln!(self.writer, "  target: {}", settings.target_extension);
        let _ = writeln!(
            self.writer,
            "  encoder: {} {} {} q{}",
            settings.profile.encoder,
            settings.profile.encoder_profile,
            settings.profile.encoder_level,
            settings.profile.quality
        );
        let _ = writeln!(
            self.writer,
            "  timeouts: scan {}, encode {}",
            reencode::format_duration(settings.scan_timeout),
            reencode::format_duration(settings.encode_timeout)
        );
        let _ = writeln!(self.writer, "  overwrite: {}", settings.overwrite);
        let _ = writeln!(self.writer, "  trash: {}", settings.trash);
        let _ = writeln!(self.writer, "  dryrun: {}", settings.dry_run);
        let _ = writeln!(self.writer, "  verbose: {}", settings.verbose);
        let _ = self.writer.flush();
    }

    /// Log a message emitted by the batch
    pub(crate) fn log_event(&mut self, event: &LogEvent) {
        let level = match event.severity {
            Severity::Info => "INFO   ",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR  ",
        };
        let _ = writeln!(self.writer, "[{}] {level} {}", Self::timestamp(), event.message);
        let _ = self.writer.flush();
    }

    /// Log the final result of one file
    pub(crate) fn log_result(&mut self, path: &Path, outcome: &FileOutcome) {
        let _ = writeln!(
            self.writer,
            "[{}] RESULT  \"{}\" | {outcome}",
            Self::timestamp(),
            path.display()
        );
        let _ = self.writer.flush();
    }

    /// Log final statistics
    pub(crate) fn log_summary(&mut self, summary: &BatchSummary) {
        let stats = &summary.stats;
        let _ = writeln!(self.writer, "[{}] STATISTICS", Self::timestamp());
        let _ = writeln!(self.writer, "  Processed:        {}/{}", summary.processed, summary.total);
        let _ = writeln!(self.writer, "  Aborted:          {}", summary.aborted);
        if let Some(error) = &summary.error {
            let _ = writeln!(self.writer, "  Error:            {error}");
        }
        let _ = writeln!(self.writer, "  Files transcoded: {}", stats.files_transcoded);
        let _ = writeln!(self.writer, "  Original kept:    {}", stats.files_delete_warnings);
        let _ = writeln!(self.writer, "  Files failed:     {}", stats.files_failed);
        let _ = writeln!(self.writer, "  Files skipped:    {}", stats.files_skipped);
        let _ = writeln!(self.writer, "  Files cancelled:  {}", stats.files_cancelled);

        if stats.files_transcoded > 0 {
            let _ = writeln!(
                self.writer,
                "  Total original size:  {}",
                reencode::format_size(stats.total_original_size)
            );
            let _ = writeln!(
                self.writer,
                "  Total converted size: {}",
                reencode::format_size(stats.total_converted_size)
            );
        }

        let _ = writeln!(
            self.writer,
            "  Total time: {}",
            reencode::format_duration(stats.total_duration)
        );
        let _ = writeln!(self.writer, "[{}] END", Self::timestamp());
        let _ = self.writer.flush();
    }
}
