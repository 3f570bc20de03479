//! Memory operation engine
//!
//! Erase, program, verify, read, write and dump on a connected device.
//! Every operation validates its arguments against the
//! [`DeviceDescriptor`](crate::device::DeviceDescriptor) before any probe
//! I/O, so a usage error never leaves the device half-modified.

mod dump;
mod operations;
mod progress;
mod segment;

pub use dump::*;
pub use operations::*;
pub use progress::*;
pub use segment::*;

use bitflags::bitflags;

/// What an erase request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// All code flash and UICR
    All,
    /// The code flash page starting at the given address
    Page(u32),
    /// The UICR page only
    Uicr,
}

/// Erase performed while programming
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EraseStrategy {
    /// Do not erase; the target must already be blank
    #[default]
    None,
    /// Erase all code flash and UICR before writing
    All,
    /// Erase the pages each segment touches
    Sectors,
    /// Erase UICR once, then the pages each segment touches
    SectorsAndUicr,
}

impl EraseStrategy {
    /// Whether each segment's pages are erased before it is written
    pub fn erases_sectors(self) -> bool {
        matches!(self, EraseStrategy::Sectors | EraseStrategy::SectorsAndUicr)
    }
}

/// Whether to check that flash is erased before writing it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlankCheck {
    /// Read back every segment first and require 0xFF everywhere
    #[default]
    Required,
    /// Write without checking
    Skip,
}

/// Options for [`Memory::program`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Erase performed before writing
    pub erase: EraseStrategy,
    /// Read back and compare every segment after writing it
    pub verify: bool,
    /// Blank check before writing
    pub blank_check: BlankCheck,
}

/// Statistics about a program operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramStats {
    /// Segments written
    pub segments: usize,
    /// Bytes written
    pub bytes_written: usize,
    /// Code flash and UICR pages erased one by one
    pub pages_erased: usize,
    /// Whether a full erase ran
    pub erased_all: bool,
}

bitflags! {
    /// Regions included in a dump
    ///
    /// An empty selection dumps code flash only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DumpSelection: u8 {
        /// Code flash
        const CODE = 1 << 0;
        /// UICR page
        const UICR = 1 << 1;
        /// RAM
        const RAM = 1 << 2;
    }
}

impl DumpSelection {
    /// Selection with the empty case resolved to code flash
    pub fn or_default(self) -> Self {
        if self.is_empty() {
            DumpSelection::CODE
        } else {
            self
        }
    }
}

impl Default for DumpSelection {
    fn default() -> Self {
        DumpSelection::CODE
    }
}
