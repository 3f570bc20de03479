//! Error types for nrfprog-core
//!
//! This module provides a no_std compatible error type shared by the
//! session, the memory engine and every probe backend.

use core::fmt;

use crate::device::{DeviceFamily, DeviceVersion};

/// Invalid or contradictory caller input, detected before any probe I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    /// Page erase address is not a multiple of the page size
    UnalignedPage {
        /// Requested page address
        addr: u32,
        /// Page size of the connected device
        page_size: u32,
    },
    /// Page erase address lies past the last code flash page
    PageOutOfRange {
        /// Requested page address
        addr: u32,
        /// Number of code flash pages on the device
        num_pages: u32,
    },
    /// A read of zero bytes was requested
    ZeroLength,
    /// The requested range runs past the end of the address space
    RangeOverflow {
        /// Start address
        addr: u32,
        /// Length in bytes
        len: u32,
    },
    /// Write to a region the device only allows reading (FICR)
    ReadOnlyRegion {
        /// Requested address
        addr: u32,
    },
    /// Word access to an address that is not 4-byte aligned
    UnalignedWord {
        /// Requested address
        addr: u32,
    },
    /// Only one of program counter and stack pointer was given
    PcSpMismatch,
    /// More than one reset kind was requested
    ConflictingResetFlags,
    /// A segment does not fit in code flash or UICR
    SegmentOutOfRange {
        /// Segment start address
        addr: u32,
        /// Segment length in bytes
        len: u32,
    },
    /// A segment carries no data
    EmptySegment {
        /// Segment start address
        addr: u32,
    },
    /// The operation does not exist for this device family
    UnsupportedOnFamily(DeviceFamily),
    /// The operation needs a device descriptor but no device is connected
    NotConnected,
}

/// Misuse of the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The session already owns a probe
    AlreadyInitialized,
    /// The session was disconnected and cannot be reused
    Closed,
}

/// Driver or transport level failure reported by a probe backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The probe library or connection could not be opened
    OpenFailed,
    /// Connecting to the emulator (debugger) failed
    EmulatorConnectFailed,
    /// The emulator is up but the target device does not answer
    DeviceConnectFailed,
    /// The driver was opened for a family that does not match the device
    WrongFamily,
    /// Generic communication failure with the probe
    Transfer,
    /// Reading target memory failed
    ReadFailed {
        /// Address of the failed access
        addr: u32,
    },
    /// Writing target memory failed
    WriteFailed {
        /// Address of the failed access
        addr: u32,
    },
    /// An erase command failed
    EraseFailed {
        /// Address of the page, or the region base for erase-all/UICR
        addr: u32,
    },
    /// The backend does not implement this primitive
    Unsupported(&'static str),
}

/// Details about a read-back mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyFailure {
    /// Start address of the segment being verified
    pub segment: u32,
    /// Address of the first mismatching byte
    pub addr: u32,
    /// Byte the segment expects
    pub expected: u8,
    /// Byte read back from the device
    pub found: u8,
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid caller input, rejected before touching hardware
    Usage(UsageError),
    /// Session lifecycle misuse
    Session(SessionError),
    /// Probe driver failure
    Probe(ProbeFailure),
    /// Flash about to be written is not in the erased state
    NotErased {
        /// Address of the first non-erased byte
        addr: u32,
        /// Value found there
        found: u8,
    },
    /// Data read back does not match the expected data
    Verify(VerifyFailure),
    /// No known family answered during auto-detection
    UnknownFamily,
    /// The device reported a variant missing from the descriptor table
    UnknownDeviceVersion(DeviceVersion),
    /// A hardware operation did not complete in time
    Timeout,
    /// The output sink rejected formatted data
    Output,
}

impl Error {
    /// Whether this is the "wrong family for device" signal used during
    /// family auto-detection
    pub fn is_wrong_family(&self) -> bool {
        matches!(self, Error::Probe(ProbeFailure::WrongFamily))
    }
}

impl From<UsageError> for Error {
    fn from(e: UsageError) -> Self {
        Error::Usage(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Session(e)
    }
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::Output
    }
}

impl From<ProbeFailure> for Error {
    fn from(e: ProbeFailure) -> Self {
        Error::Probe(e)
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnalignedPage { addr, page_size } => write!(
                f,
                "page address 0x{:08X} is not aligned to the page size 0x{:X}",
                addr, page_size
            ),
            Self::PageOutOfRange { addr, num_pages } => write!(
                f,
                "page address 0x{:08X} is outside code flash ({} pages)",
                addr, num_pages
            ),
            Self::ZeroLength => write!(f, "length must be greater than zero"),
            Self::RangeOverflow { addr, len } => write!(
                f,
                "range 0x{:08X}+0x{:X} runs past the end of the address space",
                addr, len
            ),
            Self::ReadOnlyRegion { addr } => {
                write!(f, "address 0x{:08X} is in a read-only region", addr)
            }
            Self::UnalignedWord { addr } => {
                write!(f, "address 0x{:08X} is not word aligned", addr)
            }
            Self::PcSpMismatch => write!(f, "both the PC and the SP must be specified"),
            Self::ConflictingResetFlags => write!(f, "only one reset kind can be specified"),
            Self::SegmentOutOfRange { addr, len } => write!(
                f,
                "segment 0x{:08X}+0x{:X} is not inside code flash or UICR",
                addr, len
            ),
            Self::EmptySegment { addr } => write!(f, "segment at 0x{:08X} is empty", addr),
            Self::UnsupportedOnFamily(family) => {
                write!(f, "operation is not valid for {} devices", family)
            }
            Self::NotConnected => write!(f, "no device connected"),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "session already owns a probe"),
            Self::Closed => write!(f, "session is closed"),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "cannot open probe"),
            Self::EmulatorConnectFailed => write!(f, "cannot connect to emulator"),
            Self::DeviceConnectFailed => write!(f, "cannot connect to device"),
            Self::WrongFamily => write!(f, "wrong family for device"),
            Self::Transfer => write!(f, "probe communication failed"),
            Self::ReadFailed { addr } => write!(f, "memory read failed at 0x{:08X}", addr),
            Self::WriteFailed { addr } => write!(f, "memory write failed at 0x{:08X}", addr),
            Self::EraseFailed { addr } => write!(f, "erase failed at 0x{:08X}", addr),
            Self::Unsupported(what) => write!(f, "{} is not supported by this probe", what),
        }
    }
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verify failed in segment 0x{:08X}: 0x{:08X} expected 0x{:02X}, found 0x{:02X}",
            self.segment, self.addr, self.expected, self.found
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(e) => write!(f, "{}", e),
            Self::Session(e) => write!(f, "{}", e),
            Self::Probe(e) => write!(f, "{}", e),
            Self::NotErased { addr, found } => write!(
                f,
                "flash being written to must be erased: 0x{:08X} holds 0x{:02X}",
                addr, found
            ),
            Self::Verify(e) => write!(f, "{}", e),
            Self::UnknownFamily => write!(f, "unknown device family"),
            Self::UnknownDeviceVersion(v) => write!(f, "unknown device version {}", v),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Output => write!(f, "failed to write output"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_wrong_family_detection() {
        assert!(Error::Probe(ProbeFailure::WrongFamily).is_wrong_family());
        assert!(!Error::Probe(ProbeFailure::OpenFailed).is_wrong_family());
        assert!(!Error::UnknownFamily.is_wrong_family());
    }

    #[test]
    fn test_messages() {
        let e = Error::from(UsageError::PcSpMismatch);
        assert_eq!(e.to_string(), "both the PC and the SP must be specified");

        let e = Error::NotErased { addr: 0x1000, found: 0 };
        assert!(e.to_string().starts_with("flash being written to must be erased"));
    }
}
