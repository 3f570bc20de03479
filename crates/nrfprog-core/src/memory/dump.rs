//! Text rendering of memory contents
//!
//! One line per 4 bytes, e.g. `0x20000000: [0x0 0x20 0x0 0x20]`. Addresses
//! and bytes use lowercase hex without padding; the last group of a range
//! may hold fewer than 4 bytes.

use core::fmt::{self, Write};

use super::DumpSelection;
use crate::device::Region;

/// Bytes per dump line
pub const BYTES_PER_LINE: usize = 4;

/// Sections of a dump, in output order
pub const DUMP_ORDER: [(DumpSelection, Region); 3] = [
    (DumpSelection::CODE, Region::Flash),
    (DumpSelection::UICR, Region::Uicr),
    (DumpSelection::RAM, Region::Ram),
];

/// Title printed above a dump section
pub fn section_title(region: Region) -> &'static str {
    match region {
        Region::Flash => "Code FLASH",
        Region::Uicr => "UICR",
        Region::Ram => "RAM",
        Region::Ficr => "FICR",
        Region::Unmapped => "Unmapped",
    }
}

/// Write the `----------<title>----------` header and its blank line
pub fn write_section_header<W: Write + ?Sized>(w: &mut W, region: Region) -> fmt::Result {
    write!(w, "----------{}----------\n\n", section_title(region))
}

/// Write `data`, read from `addr`, as dump lines
pub fn write_lines<W: Write + ?Sized>(w: &mut W, addr: u32, data: &[u8]) -> fmt::Result {
    for (i, group) in data.chunks(BYTES_PER_LINE).enumerate() {
        let line_addr = addr.wrapping_add((i * BYTES_PER_LINE) as u32);
        write!(w, "{:#x}: [", line_addr)?;
        for (j, byte) in group.iter().enumerate() {
            if j > 0 {
                w.write_char(' ')?;
            }
            write!(w, "{:#x}", byte)?;
        }
        w.write_str("]\n")?;
    }
    Ok(())
}
