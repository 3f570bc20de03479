//! Progress reporting callbacks

use super::ProgramStats;

/// Callback for progress reporting during long memory operations
pub trait Progress {
    /// Called when starting to write `total_bytes`
    fn writing(&mut self, total_bytes: usize);

    /// Called to update write progress
    fn write_progress(&mut self, bytes_written: usize);

    /// Called when starting to read or compare `total_bytes`
    fn reading(&mut self, total_bytes: usize);

    /// Called to update read progress
    fn read_progress(&mut self, bytes_read: usize);

    /// Called when a program operation is complete
    fn complete(&mut self, stats: &ProgramStats);
}

/// A no-op progress reporter
pub struct NoProgress;

impl Progress for NoProgress {
    fn writing(&mut self, _total_bytes: usize) {}
    fn write_progress(&mut self, _bytes_written: usize) {}
    fn reading(&mut self, _total_bytes: usize) {}
    fn read_progress(&mut self, _bytes_read: usize) {}
    fn complete(&mut self, _stats: &ProgramStats) {}
}
