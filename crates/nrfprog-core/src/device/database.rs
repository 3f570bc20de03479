//! Device descriptor table
//!
//! Maps variant identifiers to memory geometry. The built-in table covers
//! the variants the nRF5x probe libraries report; with the `std` feature
//! further entries can be loaded from RON files at runtime.

use alloc::vec::Vec;

use super::family::{DeviceFamily, DeviceVersion};
use super::types::DeviceDescriptor;

/// One row of the descriptor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Variant identifier
    pub version: DeviceVersion,
    /// Family the variant belongs to
    pub family: DeviceFamily,
    /// Code flash size in bytes
    pub flash_size: u32,
    /// RAM size in bytes
    pub ram_size: u32,
    /// Flash page size in bytes
    pub page_size: u32,
}

impl DeviceEntry {
    /// Build the descriptor for this entry
    pub fn descriptor(&self) -> Option<DeviceDescriptor> {
        DeviceDescriptor::new(
            self.family,
            self.version.clone(),
            self.flash_size,
            self.ram_size,
            self.page_size,
        )
    }
}

struct BuiltinEntry {
    version: &'static str,
    family: DeviceFamily,
    flash_size: u32,
    ram_size: u32,
    page_size: u32,
}

const fn nrf51(version: &'static str, flash_size: u32, ram_size: u32) -> BuiltinEntry {
    BuiltinEntry {
        version,
        family: DeviceFamily::Nrf51,
        flash_size,
        ram_size,
        page_size: 0x400,
    }
}

const fn nrf52(version: &'static str, flash_size: u32, ram_size: u32) -> BuiltinEntry {
    BuiltinEntry {
        version,
        family: DeviceFamily::Nrf52,
        flash_size,
        ram_size,
        page_size: 0x1000,
    }
}

static BUILTIN: &[BuiltinEntry] = &[
    nrf52("NRF52_FP1", 0x80000, 0x10000),
    nrf52("NRF52_FP1_ENGB", 0x80000, 0x8000),
    nrf52("NRF52_FP1_ENGA", 0x80000, 0x4000),
    nrf51("NRF51_XLR3LC", 0x40000, 0x4000),
    nrf51("NRF51_XLR3P", 0x40000, 0x8000),
    nrf51("NRF51_L3", 0x20000, 0x4000),
    nrf51("NRF51_XLR3", 0x40000, 0x4000),
    nrf51("NRF51_XLR2", 0x40000, 0x4000),
    nrf51("NRF51_XLR1", 0x40000, 0x4000),
    nrf52("NRF52810_xxAA_REV1", 0x30000, 0x6000),
    nrf52("NRF52811_xxAA_REV1", 0x30000, 0x6000),
    nrf52("NRF52832_xxAA_REV1", 0x80000, 0x10000),
    nrf52("NRF52832_xxAA_REV2", 0x80000, 0x10000),
    nrf52("NRF52832_xxAB_REV1", 0x40000, 0x8000),
    nrf52("NRF52833_xxAA_REV1", 0x80000, 0x20000),
    nrf52("NRF52840_xxAA_REV1", 0x100000, 0x40000),
];

/// Descriptor table with lookup by variant identifier
#[derive(Debug, Clone, Default)]
pub struct DeviceDatabase {
    entries: Vec<DeviceEntry>,
}

impl DeviceDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database holding the built-in table
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|e| DeviceEntry {
                version: DeviceVersion::new(e.version),
                family: e.family,
                flash_size: e.flash_size,
                ram_size: e.ram_size,
                page_size: e.page_size,
            })
            .collect();
        Self { entries }
    }

    /// Number of known variants
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn entries(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.entries.iter()
    }

    /// Add an entry, replacing any entry with the same identifier
    ///
    /// Returns `false` (and leaves the table untouched) if the geometry is
    /// invalid.
    pub fn add(&mut self, entry: DeviceEntry) -> bool {
        if entry.descriptor().is_none() {
            return false;
        }
        match self.entries.iter_mut().find(|e| e.version == entry.version) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        true
    }

    /// Resolve a variant identifier to its descriptor
    pub fn lookup(&self, version: &DeviceVersion) -> Option<DeviceDescriptor> {
        self.entries
            .iter()
            .find(|e| &e.version == version)
            .and_then(DeviceEntry::descriptor)
    }

    /// Find the first variant of a family with the given flash and RAM sizes
    ///
    /// Used by backends that can only measure the geometry of the device,
    /// not read a variant identifier.
    pub fn find_by_geometry(
        &self,
        family: DeviceFamily,
        flash_size: u32,
        ram_size: u32,
    ) -> Option<&DeviceEntry> {
        self.entries
            .iter()
            .find(|e| e.family == family && e.flash_size == flash_size && e.ram_size == ram_size)
    }
}

#[cfg(feature = "std")]
mod ron_loader {
    use super::*;
    use std::fs;
    use std::path::Path;

    /// Error type for descriptor file loading
    #[derive(Debug, thiserror::Error)]
    pub enum DatabaseError {
        /// I/O error reading files
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),
        /// RON parsing error
        #[error("Parse error: {0}")]
        Parse(#[from] ron::error::SpannedError),
        /// An entry has an impossible geometry
        #[error("Validation error: {0}")]
        Validation(String),
    }

    /// Size specification with human-readable units (for RON parsing)
    #[derive(Debug, Clone, Copy, serde::Deserialize)]
    pub enum Size {
        /// Size in bytes
        B(u32),
        /// Size in kibibytes (1024 bytes)
        KiB(u32),
        /// Size in mebibytes (1024 * 1024 bytes)
        MiB(u32),
    }

    impl Size {
        /// Convert to bytes, `None` if the size does not fit in 32 bits
        pub fn to_bytes(self) -> Option<u32> {
            match self {
                Size::B(n) => Some(n),
                Size::KiB(n) => n.checked_mul(1024),
                Size::MiB(n) => n.checked_mul(1024 * 1024),
            }
        }
    }

    #[derive(Debug, serde::Deserialize)]
    struct EntryDef {
        name: String,
        family: DeviceFamily,
        flash_size: Size,
        ram_size: Size,
        page_size: Size,
    }

    impl DeviceDatabase {
        /// Parse RON text and add its entries
        ///
        /// Returns the number of entries added.
        pub fn load_str(&mut self, text: &str) -> Result<usize, DatabaseError> {
            let defs: Vec<EntryDef> = ron::from_str(text)?;
            let count = defs.len();

            for def in defs {
                let size = |s: Size| {
                    s.to_bytes().ok_or_else(|| {
                        DatabaseError::Validation(format!("{}: {:?} is too large", def.name, s))
                    })
                };
                let entry = DeviceEntry {
                    version: DeviceVersion::new(&def.name),
                    family: def.family,
                    flash_size: size(def.flash_size)?,
                    ram_size: size(def.ram_size)?,
                    page_size: size(def.page_size)?,
                };
                if !self.add(entry) {
                    return Err(DatabaseError::Validation(format!(
                        "{}: invalid geometry (flash not a multiple of the page size, \
                         or a region past the end of the address space)",
                        def.name
                    )));
                }
            }

            Ok(count)
        }

        /// Load a RON file of device entries
        pub fn load_file(&mut self, path: &Path) -> Result<usize, DatabaseError> {
            let text = fs::read_to_string(path)?;
            let count = self.load_str(&text)?;
            log::debug!("Loaded {} device entries from {}", count, path.display());
            Ok(count)
        }
    }
}

#[cfg(feature = "std")]
pub use ron_loader::{DatabaseError, Size};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let db = DeviceDatabase::builtin();
        let d = db.lookup(&DeviceVersion::new("NRF51_XLR3P")).unwrap();
        assert_eq!(d.family, DeviceFamily::Nrf51);
        assert_eq!(d.flash_size, 0x40000);
        assert_eq!(d.ram_size, 0x8000);
        assert_eq!(d.page_size, 0x400);
        assert_eq!(d.num_flash_pages, 256);

        assert!(db.lookup(&DeviceVersion::new("NRF99_FOO")).is_none());
    }

    #[test]
    fn test_builtin_entries_are_consistent() {
        let db = DeviceDatabase::builtin();
        for e in db.entries() {
            assert!(e.descriptor().is_some(), "{} has bad geometry", e.version);
            assert_eq!(e.version.family(), Some(e.family), "{}", e.version);
        }
    }

    #[test]
    fn test_geometry_search() {
        let db = DeviceDatabase::builtin();
        let e = db
            .find_by_geometry(DeviceFamily::Nrf51, 0x20000, 0x4000)
            .unwrap();
        assert_eq!(e.version.as_str(), "NRF51_L3");
        assert!(db
            .find_by_geometry(DeviceFamily::Nrf52, 0x20000, 0x4000)
            .is_none());
    }

    #[test]
    fn test_add_replaces() {
        let mut db = DeviceDatabase::builtin();
        let before = db.len();
        assert!(db.add(DeviceEntry {
            version: DeviceVersion::new("NRF52_FP1"),
            family: DeviceFamily::Nrf52,
            flash_size: 0x40000,
            ram_size: 0x8000,
            page_size: 0x1000,
        }));
        assert_eq!(db.len(), before);
        let d = db.lookup(&DeviceVersion::new("NRF52_FP1")).unwrap();
        assert_eq!(d.flash_size, 0x40000);

        assert!(!db.add(DeviceEntry {
            version: DeviceVersion::new("NRF52_BROKEN"),
            family: DeviceFamily::Nrf52,
            flash_size: 0x40001,
            ram_size: 0x8000,
            page_size: 0x1000,
        }));
        assert_eq!(db.len(), before);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_load_ron() {
        let mut db = DeviceDatabase::new();
        let count = db
            .load_str(
                r#"[
                    (name: "NRF52820_xxAA_REV1", family: Nrf52,
                     flash_size: KiB(256), ram_size: KiB(32), page_size: KiB(4)),
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 1);
        let d = db.lookup(&DeviceVersion::new("NRF52820_xxAA_REV1")).unwrap();
        assert_eq!(d.flash_size, 0x40000);
        assert_eq!(d.num_flash_pages, 64);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_load_ron_rejects_oversized_entries() {
        let mut db = DeviceDatabase::new();
        let err = db
            .load_str(
                r#"[(name: "NRF52_BIG", family: Nrf52,
                     flash_size: KiB(512), ram_size: MiB(4000), page_size: KiB(4))]"#,
            )
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)), "{err}");

        // Fits in 32 bits but runs past the end of the address space
        let err = db
            .load_str(
                r#"[(name: "NRF52_BIG", family: Nrf52,
                     flash_size: KiB(512), ram_size: MiB(3584), page_size: KiB(4))]"#,
            )
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)), "{err}");
        assert!(db.is_empty());
    }

    #[test]
    fn test_descriptor_rejects_wrapping_geometry() {
        assert!(DeviceDescriptor::new(
            DeviceFamily::Nrf52,
            DeviceVersion::new("NRF52_BIG"),
            0x80000,
            0xE000_0001,
            0x1000,
        )
        .is_none());
    }
}
