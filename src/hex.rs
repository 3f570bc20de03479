//! Intel hex image loading

use nrfprog_core::memory::{merge_contiguous, MemorySegment};
use std::path::Path;
use thiserror::Error;

/// Errors while loading a hex image
#[derive(Debug, Error)]
pub enum HexError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// A record is malformed
    #[error("Invalid hex record: {0}")]
    Record(#[from] ihex::ReaderError),

    /// Two records write the same address
    #[error("Overlapping data at 0x{0:08X}")]
    Overlap(u32),

    /// The image holds no data records
    #[error("Hex file contains no data")]
    Empty,
}

/// Parse hex text into ordered, maximal contiguous segments
///
/// Data, extended linear and extended segment address records are honored;
/// start address records are ignored.
pub fn parse_segments(text: &str) -> Result<Vec<MemorySegment>, HexError> {
    let mut base_address = 0u32;
    let mut chunks: Vec<(u32, Vec<u8>)> = Vec::new();

    for record in ihex::Reader::new(text) {
        use ihex::Record::*;
        match record? {
            Data { offset, value } => {
                chunks.push((base_address.wrapping_add(offset as u32), value));
            }
            ExtendedSegmentAddress(address) => base_address = (address as u32) * 16,
            ExtendedLinearAddress(address) => base_address = (address as u32) << 16,
            EndOfFile | StartSegmentAddress { .. } | StartLinearAddress(_) => {}
        }
    }

    if chunks.iter().all(|(_, data)| data.is_empty()) {
        return Err(HexError::Empty);
    }

    chunks.sort_by_key(|(address, _)| *address);
    for pair in chunks.windows(2) {
        let (a, data) = &pair[0];
        let (b, _) = &pair[1];
        if (*a as u64) + (data.len() as u64) > *b as u64 {
            return Err(HexError::Overlap(*b));
        }
    }

    Ok(merge_contiguous(chunks))
}

/// Load a hex file into segments
pub fn load_segments(path: &Path) -> Result<Vec<MemorySegment>, HexError> {
    let text = std::fs::read_to_string(path).map_err(|source| HexError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let segments = parse_segments(&text)?;
    log::debug!(
        "Loaded {} segment(s) from {}",
        segments.len(),
        path.display()
    );
    Ok(segments)
}
