//! Device session
//!
//! A session owns at most one open probe driver. [`DeviceSession::connect`]
//! auto-detects the device family by trying each family in
//! [`FAMILY_TRIAL_ORDER`] with a fresh driver; the first driver that reads
//! a variant identifier wins and all others are released.
//!
//! ```text
//!   Idle ──connect_external──► External ──┐
//!                                         ├──disconnect──► Closed
//!   connect() ─────────────► Connected ───┘
//! ```
//!
//! Dropping a session that still owns a probe disconnects and closes it.

use alloc::string::String;
use alloc::vec::Vec;

use crate::device::{
    DeviceDatabase, DeviceDescriptor, DeviceFamily, DeviceVersion, FAMILY_TRIAL_ORDER,
};
use crate::error::{Error, Result, SessionError, UsageError};
use crate::memory::Memory;
use crate::probe::{ProbeDriver, ProbeFactory, DEFAULT_CLOCK_SPEED_KHZ};

/// Emulator selection for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectParams {
    /// Serial number of the emulator, or the first one found
    pub serial: Option<u32>,
    /// Debug clock speed in kHz, or [`DEFAULT_CLOCK_SPEED_KHZ`]
    pub clock_khz: Option<u32>,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No probe owned yet
    Idle,
    /// Probe connected and device identified
    Connected,
    /// Probe adopted from the caller, device not identified
    External,
    /// Probe released; the session is dead
    Closed,
}

fn connect_to_emu<P: ProbeDriver + ?Sized>(probe: &mut P, params: &ConnectParams) -> Result<()> {
    let clock_khz = params.clock_khz.unwrap_or(DEFAULT_CLOCK_SPEED_KHZ);
    match params.serial {
        Some(serial) => probe.connect_to_emu_with_snr(serial, clock_khz),
        None => probe.connect_to_emu_without_snr(clock_khz),
    }
}

/// Disconnect (if connected) and close, attempting both steps
///
/// Reports the first error.
fn release<P: ProbeDriver + ?Sized>(probe: &mut P, connected: bool) -> Result<()> {
    let disconnect = if connected {
        probe.disconnect_from_emu()
    } else {
        Ok(())
    };
    let close = probe.close();
    disconnect.and(close)
}

/// Release a probe on an error path, where the original error wins
fn release_quietly<P: ProbeDriver + ?Sized>(probe: &mut P, connected: bool) {
    if let Err(e) = release(probe, connected) {
        log::warn!("Failed to release {} probe: {}", probe.family(), e);
    }
}

/// Exclusive owner of one probe and the device behind it
pub struct DeviceSession<P: ProbeDriver> {
    probe: Option<P>,
    state: SessionState,
    device_version: Option<DeviceVersion>,
    descriptor: Option<DeviceDescriptor>,
    params: ConnectParams,
}

impl<P: ProbeDriver> DeviceSession<P> {
    /// Create a session that owns nothing yet
    pub fn new(params: ConnectParams) -> Self {
        Self {
            probe: None,
            state: SessionState::Idle,
            device_version: None,
            descriptor: None,
            params,
        }
    }

    /// Open a probe, detect the device family and identify the device
    pub fn connect<F>(params: ConnectParams, factory: &mut F, db: &DeviceDatabase) -> Result<Self>
    where
        F: ProbeFactory<Probe = P>,
    {
        for family in FAMILY_TRIAL_ORDER {
            log::debug!("Trying device family {}", family);
            let mut probe = factory.create(family)?;
            probe.open()?;

            if let Err(e) = connect_to_emu(&mut probe, &params) {
                release_quietly(&mut probe, false);
                return Err(e);
            }

            let version = match probe.read_device_version() {
                Ok(version) => version,
                Err(e) if e.is_wrong_family() => {
                    log::debug!("Device is not an {} device", family);
                    release(&mut probe, true)?;
                    continue;
                }
                Err(e) => {
                    release_quietly(&mut probe, true);
                    return Err(e);
                }
            };

            let descriptor = match db.lookup(&version) {
                Some(descriptor) => descriptor,
                None => {
                    release_quietly(&mut probe, true);
                    return Err(Error::UnknownDeviceVersion(version));
                }
            };
            if descriptor.family != family {
                log::warn!(
                    "{} is listed as {} but answered as {}",
                    version,
                    descriptor.family,
                    family
                );
            }

            log::info!("Connected to {} ({})", version, family);
            return Ok(Self {
                probe: Some(probe),
                state: SessionState::Connected,
                device_version: Some(version),
                descriptor: Some(descriptor),
                params,
            });
        }

        Err(Error::UnknownFamily)
    }

    /// Adopt a probe the caller already opened for a specific family
    ///
    /// The probe is connected to the emulator with this session's
    /// parameters. No device identification takes place, which is what
    /// recovering a protected device needs.
    pub fn connect_external(&mut self, mut probe: P) -> Result<()> {
        match self.state {
            SessionState::Closed => return Err(SessionError::Closed.into()),
            SessionState::Idle => {}
            _ => return Err(SessionError::AlreadyInitialized.into()),
        }

        if let Err(e) = connect_to_emu(&mut probe, &self.params) {
            release_quietly(&mut probe, false);
            return Err(e);
        }
        self.probe = Some(probe);
        self.state = SessionState::External;
        Ok(())
    }

    /// Disconnect from the emulator and close the probe
    ///
    /// Both steps are attempted; the first error is returned. The session
    /// is closed afterwards either way.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed.into());
        }
        self.state = SessionState::Closed;
        self.device_version = None;
        self.descriptor = None;
        match self.probe.take() {
            Some(mut probe) => release(&mut probe, true),
            None => Ok(()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connection parameters
    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    /// Variant identifier of the connected device
    pub fn device_version(&self) -> Option<&DeviceVersion> {
        self.device_version.as_ref()
    }

    /// Descriptor of the connected device
    pub fn descriptor(&self) -> Result<&DeviceDescriptor> {
        self.check_open()?;
        self.descriptor
            .as_ref()
            .ok_or_else(|| UsageError::NotConnected.into())
    }

    /// Family of the owned probe
    pub fn family(&self) -> Option<DeviceFamily> {
        self.probe.as_ref().map(|p| p.family())
    }

    fn check_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            Err(SessionError::Closed.into())
        } else {
            Ok(())
        }
    }

    /// Direct access to the owned probe
    pub fn probe_mut(&mut self) -> Result<&mut P> {
        self.check_open()?;
        self.probe
            .as_mut()
            .ok_or_else(|| UsageError::NotConnected.into())
    }

    /// Memory operation engine for the connected device
    pub fn memory(&mut self) -> Result<Memory<'_, P>> {
        self.check_open()?;
        match (self.probe.as_mut(), self.descriptor.as_ref()) {
            (Some(probe), Some(descriptor)) => Ok(Memory::new(probe, descriptor)),
            _ => Err(UsageError::NotConnected.into()),
        }
    }

    /// Erase everything, removing readback protection
    ///
    /// Works on both connected and external sessions.
    pub fn recover(&mut self) -> Result<()> {
        let probe = self.probe_mut()?;
        log::debug!("Recovering {} device", probe.family());
        probe.recover()
    }
}

impl<P: ProbeDriver> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        if let Some(mut probe) = self.probe.take() {
            log::debug!("Releasing probe on session drop");
            release_quietly(&mut probe, true);
        }
    }
}

/// Open a driver for `family` without touching the emulator
pub fn open_probe<F: ProbeFactory>(factory: &mut F, family: DeviceFamily) -> Result<F::Probe> {
    let mut probe = factory.create(family)?;
    probe.open()?;
    Ok(probe)
}

fn with_open_probe<F, T, Q>(factory: &mut F, query: Q) -> Result<T>
where
    F: ProbeFactory,
    Q: FnOnce(&mut F::Probe) -> Result<T>,
{
    let mut probe = open_probe(factory, DeviceFamily::Nrf52)?;
    let result = query(&mut probe);
    match result {
        Ok(value) => probe.close().map(|_| value),
        Err(e) => {
            release_quietly(&mut probe, false);
            Err(e)
        }
    }
}

/// Serial numbers of every emulator attached to the host
pub fn enumerate_probes<F: ProbeFactory>(factory: &mut F) -> Result<Vec<u32>> {
    with_open_probe(factory, |probe| probe.enum_emu_snr())
}

/// Version string of the probe library or server
pub fn probe_version<F: ProbeFactory>(factory: &mut F) -> Result<String> {
    with_open_probe(factory, |probe| probe.version())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockFactory, MockProbe};

    #[test]
    fn test_connect_falls_back_to_second_family() {
        let db = DeviceDatabase::builtin();
        let mut factory = MockFactory::new(DeviceFamily::Nrf51, "NRF51_XLR3P");
        let session = DeviceSession::connect(ConnectParams::default(), &mut factory, &db).unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.family(), Some(DeviceFamily::Nrf51));
        assert_eq!(session.descriptor().unwrap().ram_size, 0x8000);
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Close), 1);
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Disconnect), 1);
        assert_eq!(factory.calls(DeviceFamily::Nrf51, &Call::Close), 0);
        assert_eq!(
            factory.calls(DeviceFamily::Nrf51, &Call::Connect(DEFAULT_CLOCK_SPEED_KHZ)),
            1
        );
    }

    #[test]
    fn test_connect_with_serial() {
        let db = DeviceDatabase::builtin();
        let mut factory = MockFactory::new(DeviceFamily::Nrf52, "NRF52_FP1");
        let params = ConnectParams {
            serial: Some(682000001),
            clock_khz: None,
        };
        let _session = DeviceSession::connect(params, &mut factory, &db).unwrap();
        assert_eq!(
            factory.calls(
                DeviceFamily::Nrf52,
                &Call::ConnectSnr(682000001, DEFAULT_CLOCK_SPEED_KHZ)
            ),
            1
        );
    }

    #[test]
    fn test_connect_with_clock_only() {
        let db = DeviceDatabase::builtin();
        let mut factory = MockFactory::new(DeviceFamily::Nrf52, "NRF52_FP1");
        let params = ConnectParams {
            serial: None,
            clock_khz: Some(1000),
        };
        let _session = DeviceSession::connect(params, &mut factory, &db).unwrap();
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Connect(1000)), 1);
        assert_eq!(
            factory.calls(DeviceFamily::Nrf52, &Call::Connect(DEFAULT_CLOCK_SPEED_KHZ)),
            0
        );
    }

    #[test]
    fn test_unknown_version_releases_probe() {
        let db = DeviceDatabase::builtin();
        let mut factory = MockFactory::new(DeviceFamily::Nrf52, "NRF52999_xxZZ_REV9");
        let err = DeviceSession::connect(ConnectParams::default(), &mut factory, &db)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownDeviceVersion(_)));
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Close), 1);
    }

    #[test]
    fn test_disconnect_twice() {
        let db = DeviceDatabase::builtin();
        let mut factory = MockFactory::new(DeviceFamily::Nrf52, "NRF52_FP1");
        let mut session =
            DeviceSession::connect(ConnectParams::default(), &mut factory, &db).unwrap();
        session.disconnect().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            session.disconnect(),
            Err(Error::Session(SessionError::Closed))
        );
        assert!(matches!(
            session.memory().err(),
            Some(Error::Session(SessionError::Closed))
        ));
        drop(session);
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Close), 1);
    }

    #[test]
    fn test_drop_releases_probe() {
        let db = DeviceDatabase::builtin();
        let mut factory = MockFactory::new(DeviceFamily::Nrf52, "NRF52_FP1");
        {
            let _session =
                DeviceSession::connect(ConnectParams::default(), &mut factory, &db).unwrap();
        }
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Disconnect), 1);
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Close), 1);
    }

    #[test]
    fn test_connect_external() {
        let mut session = DeviceSession::new(ConnectParams::default());
        let probe = MockProbe::new(DeviceFamily::Nrf51, "NRF51_XLR3");
        let log = probe.log();
        session.connect_external(probe).unwrap();
        assert_eq!(session.state(), SessionState::External);
        assert!(session.memory().is_err());
        session.recover().unwrap();

        let again = MockProbe::new(DeviceFamily::Nrf51, "NRF51_XLR3");
        assert_eq!(
            session.connect_external(again),
            Err(Error::Session(SessionError::AlreadyInitialized))
        );
        session.disconnect().unwrap();
        assert!(log.borrow().iter().any(|(_, c)| *c == Call::Recover));
    }

    #[test]
    fn test_enumerate_closes_probe() {
        let mut factory = MockFactory::new(DeviceFamily::Nrf52, "NRF52_FP1");
        let serials = enumerate_probes(&mut factory).unwrap();
        assert_eq!(serials.len(), 2);
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Open), 1);
        assert_eq!(factory.calls(DeviceFamily::Nrf52, &Call::Close), 1);
        assert_eq!(probe_version(&mut factory).unwrap(), "mock 1.0");
    }
}
