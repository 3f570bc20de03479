//! Device families and variant identifiers

use core::fmt;
use core::str::FromStr;

/// Maximum length of a device variant identifier
pub const DEVICE_VERSION_LEN: usize = 32;

/// Broad chip generation of an nRF5x device
///
/// The family decides register layout and which probe library configuration
/// can talk to the device. It has to be discovered before flash geometry is
/// known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
pub enum DeviceFamily {
    /// nRF51 series (Cortex-M0)
    #[cfg_attr(feature = "std", serde(alias = "NRF51"))]
    Nrf51,
    /// nRF52 series (Cortex-M4)
    #[cfg_attr(feature = "std", serde(alias = "NRF52"))]
    Nrf52,
}

/// Order in which families are tried during auto-detection
pub const FAMILY_TRIAL_ORDER: [DeviceFamily; 2] = [DeviceFamily::Nrf52, DeviceFamily::Nrf51];

impl DeviceFamily {
    /// Name as used on the command line and in variant identifiers
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Nrf51 => "NRF51",
            DeviceFamily::Nrf52 => "NRF52",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceFamily {
    type Err = ();

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("nrf51") {
            Ok(DeviceFamily::Nrf51)
        } else if s.eq_ignore_ascii_case("nrf52") {
            Ok(DeviceFamily::Nrf52)
        } else {
            Err(())
        }
    }
}

/// Variant identifier reported by the probe (e.g. `NRF52_FP1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceVersion(heapless::String<DEVICE_VERSION_LEN>);

impl DeviceVersion {
    /// Create a version identifier, truncating anything past the maximum length
    pub fn new(s: &str) -> Self {
        let mut inner = heapless::String::new();
        for c in s.chars() {
            if inner.push(c).is_err() {
                break;
            }
        }
        Self(inner)
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Family encoded in the identifier prefix, if any
    pub fn family(&self) -> Option<DeviceFamily> {
        let prefix = self.as_str().get(..5)?;
        prefix.parse().ok()
    }
}

impl fmt::Display for DeviceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DeviceVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
