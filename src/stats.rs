//! Run statistics and per-file size changes.

use std::fmt;
use std::time::Duration;

use colored::Colorize;

use crate::processor::FileOutcome;

/// Statistics for the whole run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub files_transcoded: usize,
    /// Transcoded, but the original could not be removed.
    pub files_delete_warnings: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub files_dry_run: usize,
    pub files_cancelled: usize,
    pub total_original_size: u64,
    pub total_converted_size: u64,
    pub total_duration: Duration,
}

/// Size change of a single transcoded file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConversionStats {
    original_size: u64,
    converted_size: u64,
}

impl ConversionStats {
    #[must_use]
    pub const fn new(original_size: u64, converted_size: u64) -> Self {
        Self {
            original_size,
            converted_size,
        }
    }

    /// Calculate the size difference (positive = reduced, negative = increased)
    #[allow(clippy::cast_possible_wrap)]
    const fn size_difference(&self) -> i64 {
        self.original_size as i64 - self.converted_size as i64
    }

    /// Calculate the percentage change (positive = reduced, negative = increased)
    fn change_percentage(&self) -> f64 {
        if self.original_size == 0 || self.converted_size == 0 {
            return 0.0;
        }
        let diff = self.size_difference();
        diff as f64 / self.original_size as f64 * 100.0
    }
}

impl RunStats {
    pub fn add_result(&mut self, outcome: &FileOutcome, duration: Duration) {
        self.total_duration += duration;
        match outcome {
            FileOutcome::Transcoded { stats, .. } => {
                self.files_transcoded += 1;
                *self += *stats;
            }
            FileOutcome::TranscodedWithDeleteWarning { stats, .. } => {
                self.files_transcoded += 1;
                self.files_delete_warnings += 1;
                *self += *stats;
            }
            FileOutcome::Skipped(_) => self.files_skipped += 1,
            FileOutcome::DryRun => self.files_dry_run += 1,
            FileOutcome::Failed(_) => self.files_failed += 1,
            FileOutcome::Cancelled => self.files_cancelled += 1,
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub const fn space_saved(&self) -> i64 {
        self.total_original_size as i64 - self.total_converted_size as i64
    }

    pub fn print_summary(&self) {
        println!("{}", "\n--- Transcode Summary ---".bold().magenta());
        println!("Files transcoded:       {}", self.files_transcoded);
        if self.files_delete_warnings > 0 {
            println!(
                "  - Original kept:      {}",
                self.files_delete_warnings.to_string().yellow()
            );
        }
        println!(
            "Files failed:           {}",
            if self.files_failed > 0 {
                self.files_failed.to_string().red()
            } else {
                "0".normal()
            }
        );
        println!("Files skipped:          {}", self.files_skipped);
        if self.files_dry_run > 0 {
            println!("Files dry run:          {}", self.files_dry_run);
        }
        println!();

        if self.files_transcoded > 0 {
            println!(
                "Total original size:    {}",
                crate::format_size(self.total_original_size)
            );
            println!(
                "Total converted size:   {}",
                crate::format_size(self.total_converted_size)
            );

            if self.total_original_size > 0 {
                let saved = self.space_saved();
                let ratio = saved.abs() as f64 / self.total_original_size as f64 * 100.0;

                if saved >= 0 {
                    println!(
                        "Space saved:            {} ({:.1}%)",
                        crate::format_size(saved as u64),
                        ratio
                    );
                } else {
                    println!(
                        "Space increased:        {} ({:.1}%)",
                        crate::format_size(saved.unsigned_abs()),
                        ratio
                    );
                }
            }
        }

        println!("Total time:             {}", crate::format_duration(self.total_duration));
    }
}

impl fmt::Display for ConversionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:.1}%)",
            crate::format_size(self.original_size),
            crate::format_size(self.converted_size),
            self.change_percentage()
        )
    }
}

impl std::ops::AddAssign<ConversionStats> for RunStats {
    fn add_assign(&mut self, stats: ConversionStats) {
        self.total_original_size += stats.original_size;
        self.total_converted_size += stats.converted_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::error::FileError;
    use crate::processor::SkipReason;

    #[test]
    fn conversion_stats_display() {
        let stats = ConversionStats::new(2 * 1024 * 1024, 1024 * 1024);
        assert_eq!(stats.to_string(), "2.00 MB -> 1.00 MB (50.0%)");
    }

    #[test]
    fn empty_output_has_zero_change() {
        assert!(ConversionStats::new(1000, 0).change_percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn add_result_tallies_outcomes() {
        let mut stats = RunStats::default();
        let output = PathBuf::from("a.mp4");
        stats.add_result(
            &FileOutcome::Transcoded {
                output: output.clone(),
                stats: ConversionStats::new(1000, 400),
            },
            Duration::from_secs(10),
        );
        stats.add_result(
            &FileOutcome::TranscodedWithDeleteWarning {
                output,
                stats: ConversionStats::new(500, 600),
                error: "Access is denied".to_string(),
            },
            Duration::from_secs(5),
        );
        stats.add_result(
            &FileOutcome::Failed(FileError::OutputInvalid(PathBuf::from("b.mp4"))),
            Duration::from_secs(1),
        );
        stats.add_result(
            &FileOutcome::Skipped(SkipReason::OutputExists {
                path: PathBuf::from("c.mp4"),
            }),
            Duration::ZERO,
        );
        stats.add_result(
            &FileOutcome::Skipped(SkipReason::InputIsOutput {
                path: PathBuf::from("d.mp4"),
            }),
            Duration::ZERO,
        );

        assert_eq!(stats.files_transcoded, 2);
        assert_eq!(stats.files_delete_warnings, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.files_skipped, 2);
        assert_eq!(stats.total_original_size, 1500);
        assert_eq!(stats.total_converted_size, 1000);
        assert_eq!(stats.space_saved(), 500);
        assert_eq!(stats.total_duration, Duration::from_secs(16));
    }
}
