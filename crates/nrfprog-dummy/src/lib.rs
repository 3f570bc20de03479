//! nrfprog-dummy - Emulated nRF5x target for testing
//!
//! This crate provides a probe driver backed by an in-memory nRF51/nRF52
//! device. It is useful for testing and development without hardware.
//!
//! All probes created by one [`DummyProbeFactory`] share the same
//! [`DummyTarget`], so family auto-detection sees one chip no matter how
//! many drivers the session opens and closes. Every primitive is recorded
//! in the target's call log.

use std::cell::RefCell;
use std::rc::Rc;

use nrfprog_core::device::{
    DeviceDatabase, DeviceDescriptor, DeviceFamily, DeviceVersion, Region, ERASED_VALUE,
};
use nrfprog_core::error::{ProbeFailure, Result};
use nrfprog_core::probe::{CpuRegister, ProbeDriver, ProbeFactory, ProtectionLevel};

/// nRF51 readback protection configuration register (UICR RBPCONF)
pub const NRF51_RBPCONF: u32 = 0x1000_1004;
/// nRF52 access port protection register (UICR APPROTECT)
pub const NRF52_APPROTECT: u32 = 0x1000_1208;

const NUM_REGISTERS: usize = CpuRegister::ALL.len();

/// Configuration for the emulated target
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Family of the emulated chip
    pub family: DeviceFamily,
    /// Variant identifier the chip reports
    pub version: String,
    /// Serial numbers of the emulated debug probes
    pub serials: Vec<u32>,
    /// Code flash size in bytes
    pub flash_size: u32,
    /// RAM size in bytes
    pub ram_size: u32,
    /// Flash page size in bytes
    pub page_size: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self::for_version("NRF52832_xxAA_REV1")
    }
}

impl DummyConfig {
    /// Configuration for a variant from the built-in device table
    ///
    /// Unknown variants get the geometry of the family's first-generation
    /// part (family taken from the identifier prefix, nRF52 if none).
    pub fn for_version(version: &str) -> Self {
        let version_id = DeviceVersion::new(version);
        let (family, flash_size, ram_size, page_size) =
            match DeviceDatabase::builtin().lookup(&version_id) {
                Some(d) => (d.family, d.flash_size, d.ram_size, d.page_size),
                None => match version_id.family() {
                    Some(DeviceFamily::Nrf51) => (DeviceFamily::Nrf51, 0x40000, 0x4000, 0x400),
                    _ => (DeviceFamily::Nrf52, 0x80000, 0x10000, 0x1000),
                },
            };
        Self {
            family,
            version: version.to_string(),
            serials: vec![682_000_001],
            flash_size,
            ram_size,
            page_size,
        }
    }
}

/// One recorded probe primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCall {
    /// `open`
    Open,
    /// `close`
    Close,
    /// `connect_to_emu_with_snr` / `connect_to_emu_without_snr`
    ConnectToEmu {
        /// Requested serial number
        serial: Option<u32>,
        /// Requested clock speed
        clock_khz: u32,
    },
    /// `disconnect_from_emu`
    DisconnectFromEmu,
    /// `read_device_version`
    ReadDeviceVersion,
    /// `read`
    Read {
        /// Start address
        addr: u32,
        /// Byte count
        len: usize,
    },
    /// `write` / `write_u32`
    Write {
        /// Start address
        addr: u32,
        /// Byte count
        len: usize,
        /// Flash path requested
        flash: bool,
    },
    /// `erase_all`
    EraseAll,
    /// `erase_page`
    ErasePage(u32),
    /// `erase_uicr`
    EraseUicr,
    /// `debug_reset`
    DebugReset,
    /// `pin_reset`
    PinReset,
    /// `sys_reset`
    SysReset,
    /// `halt`
    Halt,
    /// `go`
    Go,
    /// `run`
    Run {
        /// Entry point
        pc: u32,
        /// Initial stack pointer
        sp: u32,
    },
    /// `read_cpu_register`
    ReadCpuRegister(CpuRegister),
    /// `readback_protect`
    ReadbackProtect(ProtectionLevel),
    /// `recover`
    Recover,
}

impl DummyCall {
    /// Whether the call touches the device (as opposed to the probe only)
    pub fn is_device_io(&self) -> bool {
        !matches!(
            self,
            DummyCall::Open
                | DummyCall::Close
                | DummyCall::ConnectToEmu { .. }
                | DummyCall::DisconnectFromEmu
        )
    }
}

/// Emulated nRF5x chip
///
/// Flash and UICR behave like NOR flash: erasing sets bytes to 0xFF and
/// programming can only clear bits. They only accept writes through the
/// flash path.
pub struct DummyTarget {
    config: DummyConfig,
    layout: DeviceDescriptor,
    flash: Vec<u8>,
    uicr: Vec<u8>,
    ficr: Vec<u8>,
    ram: Vec<u8>,
    registers: [u32; NUM_REGISTERS],
    halted: bool,
    protection: Option<ProtectionLevel>,
    log: Vec<(DeviceFamily, DummyCall)>,
}

impl DummyTarget {
    /// Create a blank chip
    ///
    /// Returns `None` if the configured geometry is invalid (zero page size
    /// or a flash size that is not a whole number of pages).
    pub fn new(config: DummyConfig) -> Option<Self> {
        let layout = DeviceDescriptor::new(
            config.family,
            DeviceVersion::new(&config.version),
            config.flash_size,
            config.ram_size,
            config.page_size,
        )?;

        let page_size = layout.page_size as usize;
        let mut ficr = vec![ERASED_VALUE; page_size];
        if page_size >= 0x18 {
            ficr[0x10..0x14].copy_from_slice(&layout.page_size.to_le_bytes());
            ficr[0x14..0x18].copy_from_slice(&layout.num_flash_pages.to_le_bytes());
        }

        Some(Self {
            flash: vec![ERASED_VALUE; layout.flash_size as usize],
            uicr: vec![ERASED_VALUE; page_size],
            ficr,
            ram: vec![0; layout.ram_size as usize],
            registers: [0; NUM_REGISTERS],
            halted: false,
            protection: None,
            log: Vec::new(),
            layout,
            config,
        })
    }

    /// Configuration the chip was built from
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Memory layout of the chip
    pub fn layout(&self) -> &DeviceDescriptor {
        &self.layout
    }

    /// Code flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// UICR contents
    pub fn uicr(&self) -> &[u8] {
        &self.uicr
    }

    /// RAM contents
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Whether the core is halted
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Active readback protection
    pub fn protection(&self) -> Option<ProtectionLevel> {
        self.protection
    }

    /// Value of a core register
    pub fn register(&self, reg: CpuRegister) -> u32 {
        self.registers[reg_index(reg)]
    }

    /// Store bytes directly, bypassing flash semantics
    pub fn poke(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let region = self.layout.region_of_range(addr, data.len() as u32);
        let mem = self
            .backing_mut(region, addr)
            .ok_or(ProbeFailure::WriteFailed { addr })?;
        mem[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Every primitive recorded so far, with the family of the calling probe
    pub fn calls(&self) -> &[(DeviceFamily, DummyCall)] {
        &self.log
    }

    /// Number of recorded calls matching `pred`
    pub fn count_calls<F: Fn(&DummyCall) -> bool>(&self, pred: F) -> usize {
        self.log.iter().filter(|(_, c)| pred(c)).count()
    }

    /// Forget the recorded calls
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn record(&mut self, family: DeviceFamily, call: DummyCall) {
        log::trace!("dummy[{}]: {:?}", family, call);
        self.log.push((family, call));
    }

    /// Backing slice starting at `addr`, running to the end of its region
    fn backing_mut(&mut self, region: Region, addr: u32) -> Option<&mut [u8]> {
        let (start, _) = self.layout.bounds(region)?;
        let offset = (addr - start) as usize;
        match region {
            Region::Flash => Some(&mut self.flash[offset..]),
            Region::Uicr => Some(&mut self.uicr[offset..]),
            Region::Ficr => Some(&mut self.ficr[offset..]),
            Region::Ram => Some(&mut self.ram[offset..]),
            Region::Unmapped => None,
        }
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        if self.protection == Some(ProtectionLevel::All) {
            return Err(ProbeFailure::ReadFailed { addr }.into());
        }
        let region = self.layout.region_of_range(addr, buf.len() as u32);
        let mem = self
            .backing_mut(region, addr)
            .ok_or(ProbeFailure::ReadFailed { addr })?;
        buf.copy_from_slice(&mem[..buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8], flash: bool) -> Result<()> {
        let region = self.layout.region_of_range(addr, data.len() as u32);
        match region {
            Region::Flash | Region::Uicr if !flash => {
                log::debug!("dummy: plain write to {} at 0x{:08X} ignored", region, addr);
                Err(ProbeFailure::WriteFailed { addr }.into())
            }
            Region::Flash | Region::Uicr => {
                let mem = self
                    .backing_mut(region, addr)
                    .ok_or(ProbeFailure::WriteFailed { addr })?;
                for (cell, byte) in mem.iter_mut().zip(data) {
                    *cell &= byte;
                }
                Ok(())
            }
            Region::Ram => self.poke(addr, data),
            Region::Ficr | Region::Unmapped => Err(ProbeFailure::WriteFailed { addr }.into()),
        }
    }

    fn erase_page(&mut self, addr: u32) -> Result<()> {
        let page_size = self.layout.page_size;
        if addr % page_size != 0 || self.layout.region_of(addr) != Region::Flash {
            return Err(ProbeFailure::EraseFailed { addr }.into());
        }
        let start = addr as usize;
        self.flash[start..start + page_size as usize].fill(ERASED_VALUE);
        Ok(())
    }

    fn erase_all(&mut self) {
        self.flash.fill(ERASED_VALUE);
        self.uicr.fill(ERASED_VALUE);
    }

    fn reset_core(&mut self) {
        let word = |i: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&self.flash[i..i + 4]);
            u32::from_le_bytes(b)
        };
        let (sp, pc) = (word(0), word(4));
        self.registers = [0; NUM_REGISTERS];
        self.registers[reg_index(CpuRegister::Sp)] = sp;
        self.registers[reg_index(CpuRegister::Msp)] = sp;
        self.registers[reg_index(CpuRegister::Pc)] = pc & !1;
        self.registers[reg_index(CpuRegister::Xpsr)] = 0x0100_0000;
        self.halted = true;
    }

    fn protect(&mut self, level: ProtectionLevel) -> Result<()> {
        let (addr, value) = match (self.config.family, level) {
            (DeviceFamily::Nrf51, ProtectionLevel::Region0) => (NRF51_RBPCONF, 0xFFFF_FF00u32),
            (DeviceFamily::Nrf51, ProtectionLevel::All) => (NRF51_RBPCONF, 0xFFFF_00FF),
            (DeviceFamily::Nrf52, ProtectionLevel::All) => (NRF52_APPROTECT, 0xFFFF_FF00),
            (DeviceFamily::Nrf52, ProtectionLevel::Region0) => {
                return Err(ProbeFailure::Unsupported("region 0 protection").into())
            }
        };
        self.write(addr, &value.to_le_bytes(), true)?;
        self.protection = match (self.protection, level) {
            (Some(ProtectionLevel::All), _) => Some(ProtectionLevel::All),
            _ => Some(level),
        };
        Ok(())
    }
}

fn reg_index(reg: CpuRegister) -> usize {
    reg as usize
}

/// Shared handle to an emulated chip
pub type SharedTarget = Rc<RefCell<DummyTarget>>;

/// Probe driver talking to a [`DummyTarget`]
pub struct DummyProbe {
    family: DeviceFamily,
    target: SharedTarget,
    open: bool,
    connected: bool,
}

impl DummyProbe {
    /// Create an unopened driver for `family` attached to `target`
    pub fn new(family: DeviceFamily, target: SharedTarget) -> Self {
        Self {
            family,
            target,
            open: false,
            connected: false,
        }
    }

    /// The chip behind this probe
    pub fn target(&self) -> &SharedTarget {
        &self.target
    }

    fn record(&self, call: DummyCall) {
        self.target.borrow_mut().record(self.family, call);
    }

    fn require_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(ProbeFailure::OpenFailed.into())
        }
    }

    /// Record `call` and fail unless connected to a device
    fn device_call(&self, call: DummyCall) -> Result<std::cell::RefMut<'_, DummyTarget>> {
        self.record(call);
        self.require_open()?;
        if !self.connected {
            return Err(ProbeFailure::DeviceConnectFailed.into());
        }
        Ok(self.target.borrow_mut())
    }

    fn connect(&mut self, serial: Option<u32>, clock_khz: u32) -> Result<()> {
        self.record(DummyCall::ConnectToEmu { serial, clock_khz });
        self.require_open()?;
        let target = self.target.borrow();
        let found = match serial {
            Some(snr) => target.config.serials.contains(&snr),
            None => !target.config.serials.is_empty(),
        };
        if !found {
            return Err(ProbeFailure::EmulatorConnectFailed.into());
        }
        drop(target);
        self.connected = true;
        Ok(())
    }
}

impl ProbeDriver for DummyProbe {
    fn family(&self) -> DeviceFamily {
        self.family
    }

    fn open(&mut self) -> Result<()> {
        self.record(DummyCall::Open);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(DummyCall::Close);
        self.require_open()?;
        self.open = false;
        self.connected = false;
        Ok(())
    }

    fn connect_to_emu_with_snr(&mut self, serial: u32, clock_khz: u32) -> Result<()> {
        self.connect(Some(serial), clock_khz)
    }

    fn connect_to_emu_without_snr(&mut self, clock_khz: u32) -> Result<()> {
        self.connect(None, clock_khz)
    }

    fn disconnect_from_emu(&mut self) -> Result<()> {
        self.record(DummyCall::DisconnectFromEmu);
        self.require_open()?;
        self.connected = false;
        Ok(())
    }

    fn read_device_version(&mut self) -> Result<DeviceVersion> {
        let target = self.device_call(DummyCall::ReadDeviceVersion)?;
        if target.config.family != self.family {
            return Err(ProbeFailure::WrongFamily.into());
        }
        Ok(DeviceVersion::new(&target.config.version))
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        self.device_call(DummyCall::Read { addr, len })?
            .read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8], flash: bool) -> Result<()> {
        let len = data.len();
        self.device_call(DummyCall::Write { addr, len, flash })?
            .write(addr, data, flash)
    }

    fn erase_all(&mut self) -> Result<()> {
        self.device_call(DummyCall::EraseAll)?.erase_all();
        Ok(())
    }

    fn erase_page(&mut self, addr: u32) -> Result<()> {
        self.device_call(DummyCall::ErasePage(addr))?
            .erase_page(addr)
    }

    fn erase_uicr(&mut self) -> Result<()> {
        self.device_call(DummyCall::EraseUicr)?
            .uicr
            .fill(ERASED_VALUE);
        Ok(())
    }

    fn debug_reset(&mut self) -> Result<()> {
        self.device_call(DummyCall::DebugReset)?.reset_core();
        Ok(())
    }

    fn pin_reset(&mut self) -> Result<()> {
        self.device_call(DummyCall::PinReset)?.reset_core();
        Ok(())
    }

    fn sys_reset(&mut self) -> Result<()> {
        self.device_call(DummyCall::SysReset)?.reset_core();
        Ok(())
    }

    fn halt(&mut self) -> Result<()> {
        self.device_call(DummyCall::Halt)?.halted = true;
        Ok(())
    }

    fn go(&mut self) -> Result<()> {
        self.device_call(DummyCall::Go)?.halted = false;
        Ok(())
    }

    fn run(&mut self, pc: u32, sp: u32) -> Result<()> {
        let mut target = self.device_call(DummyCall::Run { pc, sp })?;
        target.registers[reg_index(CpuRegister::Pc)] = pc;
        target.registers[reg_index(CpuRegister::Sp)] = sp;
        target.registers[reg_index(CpuRegister::Msp)] = sp;
        target.halted = false;
        Ok(())
    }

    fn read_cpu_register(&mut self, reg: CpuRegister) -> Result<u32> {
        let target = self.device_call(DummyCall::ReadCpuRegister(reg))?;
        Ok(target.register(reg))
    }

    fn readback_protect(&mut self, level: ProtectionLevel) -> Result<()> {
        self.device_call(DummyCall::ReadbackProtect(level))?
            .protect(level)
    }

    fn recover(&mut self) -> Result<()> {
        let mut target = self.device_call(DummyCall::Recover)?;
        target.erase_all();
        target.ram.fill(0);
        target.protection = None;
        target.reset_core();
        Ok(())
    }

    fn enum_emu_snr(&mut self) -> Result<Vec<u32>> {
        self.require_open()?;
        Ok(self.target.borrow().config.serials.clone())
    }

    fn version(&mut self) -> Result<String> {
        self.require_open()?;
        Ok(format!("dummy {}", env!("CARGO_PKG_VERSION")))
    }
}

/// Creates [`DummyProbe`]s that all share one chip
pub struct DummyProbeFactory {
    target: SharedTarget,
}

impl DummyProbeFactory {
    /// Create a factory around a fresh chip
    ///
    /// Returns `None` if the configured geometry is invalid.
    pub fn new(config: DummyConfig) -> Option<Self> {
        let target = DummyTarget::new(config)?;
        Some(Self {
            target: Rc::new(RefCell::new(target)),
        })
    }

    /// The shared chip
    pub fn target(&self) -> SharedTarget {
        self.target.clone()
    }
}

impl ProbeFactory for DummyProbeFactory {
    type Probe = DummyProbe;

    fn create(&mut self, family: DeviceFamily) -> Result<DummyProbe> {
        Ok(DummyProbe::new(family, self.target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrfprog_core::device::DeviceDatabase;
    use nrfprog_core::error::{Error, UsageError};
    use nrfprog_core::memory::{
        BlankCheck, DumpSelection, EraseMode, EraseStrategy, MemorySegment, NoProgress, ProgramOptions,
    };
    use nrfprog_core::reset::{self, ResetKind, ResetPolicy};
    use nrfprog_core::session::{ConnectParams, DeviceSession, SessionState};

    fn factory(version: &str) -> DummyProbeFactory {
        DummyProbeFactory::new(DummyConfig::for_version(version)).unwrap()
    }

    fn connect(factory: &mut DummyProbeFactory) -> DeviceSession<DummyProbe> {
        let db = DeviceDatabase::builtin();
        DeviceSession::connect(ConnectParams::default(), factory, &db).unwrap()
    }

    fn device_io(target: &SharedTarget) -> usize {
        target.borrow().count_calls(DummyCall::is_device_io)
    }

    #[test]
    fn test_family_fallback_closes_wrong_probe_once() {
        let mut factory = factory("NRF51_XLR3P");
        let session = connect(&mut factory);

        let d = session.descriptor().unwrap();
        assert_eq!(d.family, DeviceFamily::Nrf51);
        assert_eq!(d.page_size, 0x400);

        let target = factory.target();
        let target = target.borrow();
        let nrf52_closes = target
            .calls()
            .iter()
            .filter(|(f, c)| *f == DeviceFamily::Nrf52 && *c == DummyCall::Close)
            .count();
        assert_eq!(nrf52_closes, 1);
    }

    #[test]
    fn test_unknown_serial_fails_to_connect() {
        let mut factory = factory("NRF52_FP1");
        let db = DeviceDatabase::builtin();
        let params = ConnectParams {
            serial: Some(1234),
            clock_khz: Some(1000),
        };
        let err = DeviceSession::connect(params, &mut factory, &db)
            .err()
            .unwrap();
        assert_eq!(err, Error::Probe(ProbeFailure::EmulatorConnectFailed));
        // The failed driver is still closed
        let target = factory.target();
        assert_eq!(target.borrow().count_calls(|c| *c == DummyCall::Close), 1);
    }

    #[test]
    fn test_erase_all_is_idempotent() {
        let mut factory = factory("NRF52832_xxAA_REV1");
        let target = factory.target();
        target.borrow_mut().poke(0x100, &[0x12, 0x34]).unwrap();
        target.borrow_mut().poke(0x1000_1080, &[0x00]).unwrap();

        let mut session = connect(&mut factory);
        let mut mem = session.memory().unwrap();
        mem.erase(EraseMode::All).unwrap();
        let first = mem.read(0, 0x1000).unwrap();
        mem.erase(EraseMode::All).unwrap();
        let second = mem.read(0, 0x1000).unwrap();

        assert_eq!(first, second);
        assert!(second.iter().all(|&b| b == 0xFF));
        assert!(target.borrow().uicr().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_program_round_trip() {
        let mut factory = factory("NRF52832_xxAA_REV1");
        let target = factory.target();
        target.borrow_mut().poke(0x4000, &[0u8; 16]).unwrap();

        let segments = vec![
            MemorySegment::new(0x0, (0..=255u8).collect()),
            MemorySegment::new(0x5000, vec![0xA5; 0x1800]),
            MemorySegment::new(0x1000_1080, vec![0x78, 0x56, 0x34, 0x12]),
        ];
        let options = ProgramOptions {
            erase: EraseStrategy::All,
            verify: true,
            blank_check: BlankCheck::Required,
        };

        let mut session = connect(&mut factory);
        let stats = session
            .memory()
            .unwrap()
            .program(&segments, &options, &mut NoProgress)
            .unwrap();
        assert_eq!(stats.segments, 3);
        assert_eq!(stats.bytes_written, 256 + 0x1800 + 4);
        assert!(stats.erased_all);

        session
            .memory()
            .unwrap()
            .verify(&segments, &mut NoProgress)
            .unwrap();
        assert_eq!(&target.borrow().flash()[0x4000..0x4010], &[0xFF; 16]);
        assert_eq!(&target.borrow().uicr()[0x80..0x84], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_sector_erase_touches_only_covering_page() {
        let mut factory = factory("NRF52832_xxAA_REV1");
        let target = factory.target();
        target.borrow_mut().poke(0x1000, &[0u8; 4]).unwrap();
        target.borrow_mut().poke(0x2000, &[0x11; 4]).unwrap();

        let mut session = connect(&mut factory);
        target.borrow_mut().clear_log();
        let segments = vec![MemorySegment::new(0x1000, vec![0x42; 0x800])];
        let options = ProgramOptions {
            erase: EraseStrategy::Sectors,
            ..Default::default()
        };
        session
            .memory()
            .unwrap()
            .program(&segments, &options, &mut NoProgress)
            .unwrap();

        let target = target.borrow();
        let erased: Vec<u32> = target
            .calls()
            .iter()
            .filter_map(|(_, c)| match c {
                DummyCall::ErasePage(addr) => Some(*addr),
                _ => None,
            })
            .collect();
        assert_eq!(erased, vec![0x1000]);
        assert_eq!(target.count_calls(|c| *c == DummyCall::EraseAll), 0);
        assert_eq!(&target.flash()[0x2000..0x2004], &[0x11; 4]);
        assert!(target.flash()[0x1000..0x1800].iter().all(|&b| b == 0x42));
    }

    #[test]
    fn test_sectors_and_uicr_erases_uicr_once() {
        let mut factory = factory("NRF52_FP1");
        let target = factory.target();
        let mut session = connect(&mut factory);
        target.borrow_mut().clear_log();

        let segments = vec![
            MemorySegment::new(0x1000_1000, vec![0x00; 4]),
            MemorySegment::new(0x1000_1080, vec![0x00; 4]),
        ];
        let options = ProgramOptions {
            erase: EraseStrategy::SectorsAndUicr,
            ..Default::default()
        };
        session
            .memory()
            .unwrap()
            .program(&segments, &options, &mut NoProgress)
            .unwrap();
        assert_eq!(
            target.borrow().count_calls(|c| *c == DummyCall::EraseUicr),
            1
        );
    }

    #[test]
    fn test_program_without_erase_hits_blank_check() {
        let mut factory = factory("NRF52_FP1");
        factory.target().borrow_mut().poke(0x10, &[0x00]).unwrap();
        let mut session = connect(&mut factory);

        let segments = vec![MemorySegment::new(0x0, vec![0x01; 0x20])];
        let err = session
            .memory()
            .unwrap()
            .program(&segments, &ProgramOptions::default(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err, Error::NotErased { addr: 0x10, found: 0x00 });
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let mut factory = factory("NRF52_FP1");
        factory
            .target()
            .borrow_mut()
            .poke(0x200, &[1, 2, 3, 9])
            .unwrap();
        let mut session = connect(&mut factory);

        let segments = vec![MemorySegment::new(0x200, vec![1, 2, 3, 4])];
        let err = session
            .memory()
            .unwrap()
            .verify(&segments, &mut NoProgress)
            .unwrap_err();
        match err {
            Error::Verify(f) => {
                assert_eq!(f.segment, 0x200);
                assert_eq!(f.addr, 0x203);
                assert_eq!(f.expected, 4);
                assert_eq!(f.found, 9);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unaligned_page_erase_does_no_io() {
        let mut factory = factory("NRF52_FP1");
        let target = factory.target();
        let mut session = connect(&mut factory);
        let before = device_io(&target);

        let err = session
            .memory()
            .unwrap()
            .erase(EraseMode::Page(0x1001))
            .unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::UnalignedPage { .. })));
        assert_eq!(device_io(&target), before);
    }

    #[test]
    fn test_write_word_picks_path_from_address() {
        let mut factory = factory("NRF52_FP1");
        let target = factory.target();
        let mut session = connect(&mut factory);
        target.borrow_mut().clear_log();

        let mut mem = session.memory().unwrap();
        mem.write_word(0x0, 0xDEAD_BEEF).unwrap();
        mem.write_word(0x2000_0000, 0xCAFE_F00D).unwrap();

        let target = target.borrow();
        let writes: Vec<&DummyCall> = target.calls().iter().map(|(_, c)| c).collect();
        assert_eq!(
            writes,
            vec![
                &DummyCall::Write {
                    addr: 0x0,
                    len: 4,
                    flash: true
                },
                &DummyCall::Write {
                    addr: 0x2000_0000,
                    len: 4,
                    flash: false
                },
            ]
        );
        assert_eq!(&target.flash()[..4], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&target.ram()[..4], &0xCAFE_F00Du32.to_le_bytes());
    }

    #[test]
    fn test_plain_write_to_flash_rejected() {
        let mut factory = factory("NRF52_FP1");
        let mut session = connect(&mut factory);
        let err = session
            .probe_mut()
            .unwrap()
            .write_u32(0x100, 0, false)
            .unwrap_err();
        assert_eq!(err, Error::Probe(ProbeFailure::WriteFailed { addr: 0x100 }));
    }

    #[test]
    fn test_run_sequencer() {
        let mut factory = factory("NRF51_L3");
        let target = factory.target();
        let mut session = connect(&mut factory);
        target.borrow_mut().clear_log();

        let probe = session.probe_mut().unwrap();
        let err = reset::run(probe, Some(0x1000), None).unwrap_err();
        assert_eq!(err, Error::Usage(UsageError::PcSpMismatch));
        assert_eq!(device_io(&target), 0);

        reset::run(probe, Some(0x1000), Some(0x2000_4000)).unwrap();
        let t = target.borrow();
        assert_eq!(
            t.count_calls(|c| matches!(c, DummyCall::Run { .. })),
            1
        );
        assert_eq!(t.register(CpuRegister::Pc), 0x1000);
        assert_eq!(t.register(CpuRegister::Sp), 0x2000_4000);
        assert!(!t.is_halted());
    }

    #[test]
    fn test_reset_loads_vector_table_and_runs() {
        let mut factory = factory("NRF52_FP1");
        let target = factory.target();
        target
            .borrow_mut()
            .poke(0x0, &[0x00, 0x00, 0x01, 0x20, 0xC1, 0x00, 0x00, 0x00])
            .unwrap();
        let mut session = connect(&mut factory);

        let done = reset::reset(
            session.probe_mut().unwrap(),
            None,
            ResetPolicy::DefaultToSystem,
        )
        .unwrap();
        assert_eq!(done, Some(ResetKind::System));

        let regs = session.memory().unwrap().read_registers().unwrap();
        assert_eq!(regs[13], (CpuRegister::Sp, 0x2001_0000));
        assert_eq!(regs[15], (CpuRegister::Pc, 0xC0));
        assert!(!target.borrow().is_halted());
    }

    #[test]
    fn test_protect_then_recover() {
        let mut factory = factory("NRF51_XLR2");
        let target = factory.target();
        target.borrow_mut().poke(0x0, &[0u8; 8]).unwrap();

        let mut session = connect(&mut factory);
        session
            .memory()
            .unwrap()
            .readback_protect(ProtectionLevel::All)
            .unwrap();
        assert_eq!(&target.borrow().uicr()[4..8], &[0xFF, 0x00, 0xFF, 0xFF]);
        assert!(session.memory().unwrap().read(0, 4).is_err());
        session.disconnect().unwrap();

        // Recovery goes through an external session for an explicit family
        let mut session = DeviceSession::new(ConnectParams::default());
        let mut probe = factory.create(DeviceFamily::Nrf51).unwrap();
        probe.open().unwrap();
        session.connect_external(probe).unwrap();
        assert_eq!(session.state(), SessionState::External);
        session.recover().unwrap();
        session.disconnect().unwrap();

        let t = target.borrow();
        assert_eq!(t.protection(), None);
        assert!(t.flash().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_dump_code_and_ram() {
        let config = DummyConfig {
            flash_size: 0x800,
            ram_size: 0x8,
            ..DummyConfig::for_version("NRF51_TEST")
        };
        let mut factory = DummyProbeFactory::new(config).unwrap();
        factory
            .target()
            .borrow_mut()
            .poke(0x2000_0000, &[0x00, 0x20, 0x00, 0x20])
            .unwrap();

        let mut db = DeviceDatabase::builtin();
        db.add(nrfprog_core::device::DeviceEntry {
            version: DeviceVersion::new("NRF51_TEST"),
            family: DeviceFamily::Nrf51,
            flash_size: 0x800,
            ram_size: 0x8,
            page_size: 0x400,
        });
        let mut session = DeviceSession::connect(ConnectParams::default(), &mut factory, &db).unwrap();

        let mut out = String::new();
        session
            .memory()
            .unwrap()
            .dump(
                DumpSelection::CODE | DumpSelection::RAM,
                &mut out,
                &mut NoProgress,
            )
            .unwrap();

        assert!(out.starts_with("----------Code FLASH----------\n\n0x0: [0xff 0xff 0xff 0xff]\n"));
        assert!(out.ends_with(
            "0x7fc: [0xff 0xff 0xff 0xff]\n\n\n----------RAM----------\n\n\
             0x20000000: [0x0 0x20 0x0 0x20]\n0x20000004: [0x0 0x0 0x0 0x0]\n"
        ));

        // Code and UICR sections keep their blank-line trailer even when last
        let mut out = String::new();
        session
            .memory()
            .unwrap()
            .dump(DumpSelection::UICR, &mut out, &mut NoProgress)
            .unwrap();
        assert!(out.starts_with("----------UICR----------\n\n0x10001000: "));
        assert!(out.ends_with("0x100013fc: [0xff 0xff 0xff 0xff]\n\n\n"));
    }

    #[test]
    fn test_enable_pin_reset_writes_uicr() {
        let mut factory = factory("NRF52840_xxAA_REV1");
        let target = factory.target();
        let mut session = connect(&mut factory);
        session.memory().unwrap().enable_pin_reset().unwrap();

        let t = target.borrow();
        assert_eq!(&t.uicr()[0x200..0x204], &21u32.to_le_bytes());
        assert_eq!(&t.uicr()[0x204..0x208], &21u32.to_le_bytes());
        assert_eq!(t.count_calls(|c| *c == DummyCall::SysReset), 1);
    }
}
