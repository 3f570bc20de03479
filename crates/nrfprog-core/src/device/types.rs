//! Device descriptor and memory region types

use core::fmt;

use super::family::{DeviceFamily, DeviceVersion};

/// Start of code flash on every nRF5x device
pub const FLASH_START: u32 = 0x0000_0000;
/// Start of RAM on every nRF5x device
pub const RAM_START: u32 = 0x2000_0000;
/// Start of the Factory Information Configuration Registers page
pub const FICR_START: u32 = 0x1000_0000;
/// Start of the User Information Configuration Registers page
pub const UICR_START: u32 = 0x1000_1000;

/// The value every flash cell holds after an erase
pub const ERASED_VALUE: u8 = 0xFF;

/// Logical memory region an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Code flash
    Flash,
    /// RAM
    Ram,
    /// User information configuration page
    Uicr,
    /// Factory information configuration page (read-only)
    Ficr,
    /// Not backed by any known region
    Unmapped,
}

impl Region {
    /// Whether writes to this region must go through the flash-write path
    pub fn is_nvm(self) -> bool {
        matches!(self, Region::Flash | Region::Uicr)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Flash => "code flash",
            Region::Ram => "RAM",
            Region::Uicr => "UICR",
            Region::Ficr => "FICR",
            Region::Unmapped => "unmapped",
        };
        f.write_str(name)
    }
}

/// Memory geometry of one device variant
///
/// Resolved once per session from the variant identifier and never
/// mutated afterwards. All `*_end` addresses are exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Family the variant belongs to
    pub family: DeviceFamily,
    /// Variant identifier this descriptor was resolved from
    pub version: DeviceVersion,
    /// Code flash base address
    pub flash_start: u32,
    /// Code flash size in bytes
    pub flash_size: u32,
    /// Code flash end address (exclusive)
    pub flash_end: u32,
    /// RAM base address
    pub ram_start: u32,
    /// RAM size in bytes
    pub ram_size: u32,
    /// RAM end address (exclusive)
    pub ram_end: u32,
    /// FICR base address
    pub ficr_start: u32,
    /// FICR end address (exclusive, one page)
    pub ficr_end: u32,
    /// UICR base address
    pub uicr_start: u32,
    /// UICR end address (exclusive, one page)
    pub uicr_end: u32,
    /// Flash page size, the smallest erasable unit
    pub page_size: u32,
    /// Number of pages in code flash
    pub num_flash_pages: u32,
}

impl DeviceDescriptor {
    /// Build a descriptor from the variant geometry
    ///
    /// Returns `None` if the page size is zero, the flash size is not an
    /// exact multiple of it, or a region would run past the end of the
    /// address space.
    pub fn new(
        family: DeviceFamily,
        version: DeviceVersion,
        flash_size: u32,
        ram_size: u32,
        page_size: u32,
    ) -> Option<Self> {
        if page_size == 0 || flash_size % page_size != 0 {
            return None;
        }

        Some(Self {
            family,
            version,
            flash_start: FLASH_START,
            flash_size,
            flash_end: FLASH_START.checked_add(flash_size)?,
            ram_start: RAM_START,
            ram_size,
            ram_end: RAM_START.checked_add(ram_size)?,
            ficr_start: FICR_START,
            ficr_end: FICR_START.checked_add(page_size)?,
            uicr_start: UICR_START,
            uicr_end: UICR_START.checked_add(page_size)?,
            page_size,
            num_flash_pages: flash_size / page_size,
        })
    }

    /// Classify an address by range membership
    pub fn region_of(&self, addr: u32) -> Region {
        if (self.flash_start..self.flash_end).contains(&addr) {
            Region::Flash
        } else if (self.uicr_start..self.uicr_end).contains(&addr) {
            Region::Uicr
        } else if (self.ficr_start..self.ficr_end).contains(&addr) {
            Region::Ficr
        } else if (self.ram_start..self.ram_end).contains(&addr) {
            Region::Ram
        } else {
            Region::Unmapped
        }
    }

    /// Classify a range, returning the region only if the whole range
    /// `[addr, addr + len)` falls inside it
    pub fn region_of_range(&self, addr: u32, len: u32) -> Region {
        if len == 0 {
            return self.region_of(addr);
        }
        let last = match addr.checked_add(len - 1) {
            Some(last) => last,
            None => return Region::Unmapped,
        };
        let first = self.region_of(addr);
        if first == self.region_of(last) {
            first
        } else {
            Region::Unmapped
        }
    }

    /// Address range of a region as `(start, end)`, end exclusive
    pub fn bounds(&self, region: Region) -> Option<(u32, u32)> {
        match region {
            Region::Flash => Some((self.flash_start, self.flash_end)),
            Region::Ram => Some((self.ram_start, self.ram_end)),
            Region::Uicr => Some((self.uicr_start, self.uicr_end)),
            Region::Ficr => Some((self.ficr_start, self.ficr_end)),
            Region::Unmapped => None,
        }
    }

    /// Index of the page containing `addr`
    pub fn page_index(&self, addr: u32) -> u32 {
        addr / self.page_size
    }

    /// Base address of the page containing `addr`
    pub fn page_base(&self, addr: u32) -> u32 {
        addr - addr % self.page_size
    }
}
