//! Progress bars for long memory operations

use indicatif::{ProgressBar, ProgressStyle};
use nrfprog_core::memory::{ProgramStats, Progress};

/// Progress reporter using indicatif progress bars
///
/// When quiet, bars are hidden and nothing is printed.
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
    quiet: bool,
}

impl IndicatifProgress {
    /// Create a reporter
    pub fn new(quiet: bool) -> Self {
        Self {
            current_bar: None,
            quiet,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        self.finish();
        let pb = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                    phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    fn set_position(&self, pos: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(pos as u64);
        }
    }

    /// Finish the current bar, if any
    pub fn finish(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish();
        }
    }
}

impl Progress for IndicatifProgress {
    fn writing(&mut self, total_bytes: usize) {
        self.create_bar(total_bytes as u64, "Writing");
    }

    fn write_progress(&mut self, bytes_written: usize) {
        self.set_position(bytes_written);
    }

    fn reading(&mut self, total_bytes: usize) {
        self.create_bar(total_bytes as u64, "Reading");
    }

    fn read_progress(&mut self, bytes_read: usize) {
        self.set_position(bytes_read);
    }

    fn complete(&mut self, stats: &ProgramStats) {
        self.finish();
        if self.quiet {
            return;
        }
        let erase = if stats.erased_all {
            "full erase".to_string()
        } else {
            format!("{} page(s) erased", stats.pages_erased)
        };
        println!(
            "Programmed {} bytes in {} segment(s), {}",
            stats.bytes_written, stats.segments, erase
        );
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
    }
}
