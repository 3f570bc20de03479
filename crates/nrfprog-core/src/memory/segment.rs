//! Contiguous chunks of image data

use alloc::vec::Vec;

/// Bytes to be placed at a device address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySegment {
    /// Start address
    pub address: u32,
    /// Contents
    pub data: Vec<u8>,
}

impl MemorySegment {
    /// Create a segment
    pub fn new(address: u32, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the segment holds no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Exclusive end address
    pub fn end(&self) -> u32 {
        self.address.wrapping_add(self.data.len() as u32)
    }
}

/// Merge address-ordered chunks into maximal contiguous segments
///
/// Chunks are taken in order; a chunk starting exactly where the previous
/// segment ends extends it, anything else starts a new segment.
pub fn merge_contiguous<I>(chunks: I) -> Vec<MemorySegment>
where
    I: IntoIterator<Item = (u32, Vec<u8>)>,
{
    let mut segments: Vec<MemorySegment> = Vec::new();
    for (address, data) in chunks {
        if data.is_empty() {
            continue;
        }
        match segments.last_mut() {
            Some(last) if last.end() == address => last.data.extend_from_slice(&data),
            _ => segments.push(MemorySegment::new(address, data)),
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_merge_contiguous() {
        let segs = merge_contiguous(vec![
            (0x0, vec![1, 2]),
            (0x2, vec![3, 4]),
            (0x10, vec![5]),
            (0x11, vec![]),
            (0x11, vec![6]),
        ]);
        assert_eq!(
            segs,
            vec![
                MemorySegment::new(0x0, vec![1, 2, 3, 4]),
                MemorySegment::new(0x10, vec![5, 6]),
            ]
        );
    }

    #[test]
    fn test_out_of_order_not_merged() {
        let segs = merge_contiguous(vec![(0x10, vec![1]), (0x0, vec![2])]);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].address, 0x0);
    }
}
