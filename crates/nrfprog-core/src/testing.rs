//! Recording probe used by the unit tests in this crate

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::device::{DeviceFamily, DeviceVersion};
use crate::error::{ProbeFailure, Result};
use crate::probe::{CpuRegister, ProbeDriver, ProbeFactory, ProtectionLevel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    Close,
    ConnectSnr(u32, u32),
    Connect(u32),
    Disconnect,
    ReadVersion,
    Read(u32, usize),
    Write(u32, usize, bool),
    EraseAll,
    ErasePage(u32),
    EraseUicr,
    DebugReset,
    PinReset,
    SysReset,
    Halt,
    Go,
    Run(u32, u32),
    ReadRegister(CpuRegister),
    Protect(ProtectionLevel),
    Recover,
}

pub type CallLog = Rc<RefCell<Vec<(DeviceFamily, Call)>>>;

/// Probe over a sparse byte map; unwritten bytes read as 0xFF
pub struct MockProbe {
    family: DeviceFamily,
    device_family: DeviceFamily,
    version: DeviceVersion,
    memory: Rc<RefCell<BTreeMap<u32, u8>>>,
    log: CallLog,
}

impl MockProbe {
    pub fn new(family: DeviceFamily, version: &str) -> Self {
        Self {
            family,
            device_family: family,
            version: DeviceVersion::new(version),
            memory: Rc::default(),
            log: Rc::default(),
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn poke(&self, addr: u32, data: &[u8]) {
        let mut mem = self.memory.borrow_mut();
        for (i, b) in data.iter().enumerate() {
            mem.insert(addr + i as u32, *b);
        }
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push((self.family, call));
    }
}

impl ProbeDriver for MockProbe {
    fn family(&self) -> DeviceFamily {
        self.family
    }

    fn open(&mut self) -> Result<()> {
        self.record(Call::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }

    fn connect_to_emu_with_snr(&mut self, serial: u32, clock_khz: u32) -> Result<()> {
        self.record(Call::ConnectSnr(serial, clock_khz));
        Ok(())
    }

    fn connect_to_emu_without_snr(&mut self, clock_khz: u32) -> Result<()> {
        self.record(Call::Connect(clock_khz));
        Ok(())
    }

    fn disconnect_from_emu(&mut self) -> Result<()> {
        self.record(Call::Disconnect);
        Ok(())
    }

    fn read_device_version(&mut self) -> Result<DeviceVersion> {
        self.record(Call::ReadVersion);
        if self.family != self.device_family {
            return Err(ProbeFailure::WrongFamily.into());
        }
        Ok(self.version.clone())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.record(Call::Read(addr, buf.len()));
        let mem = self.memory.borrow();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = *mem.get(&(addr + i as u32)).unwrap_or(&0xFF);
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8], flash: bool) -> Result<()> {
        self.record(Call::Write(addr, data.len(), flash));
        self.poke(addr, data);
        Ok(())
    }

    fn erase_all(&mut self) -> Result<()> {
        self.record(Call::EraseAll);
        self.memory.borrow_mut().clear();
        Ok(())
    }

    fn erase_page(&mut self, addr: u32) -> Result<()> {
        self.record(Call::ErasePage(addr));
        Ok(())
    }

    fn erase_uicr(&mut self) -> Result<()> {
        self.record(Call::EraseUicr);
        Ok(())
    }

    fn debug_reset(&mut self) -> Result<()> {
        self.record(Call::DebugReset);
        Ok(())
    }

    fn pin_reset(&mut self) -> Result<()> {
        self.record(Call::PinReset);
        Ok(())
    }

    fn sys_reset(&mut self) -> Result<()> {
        self.record(Call::SysReset);
        Ok(())
    }

    fn halt(&mut self) -> Result<()> {
        self.record(Call::Halt);
        Ok(())
    }

    fn go(&mut self) -> Result<()> {
        self.record(Call::Go);
        Ok(())
    }

    fn run(&mut self, pc: u32, sp: u32) -> Result<()> {
        self.record(Call::Run(pc, sp));
        Ok(())
    }

    fn read_cpu_register(&mut self, reg: CpuRegister) -> Result<u32> {
        self.record(Call::ReadRegister(reg));
        Ok(reg as u32)
    }

    fn readback_protect(&mut self, level: ProtectionLevel) -> Result<()> {
        self.record(Call::Protect(level));
        Ok(())
    }

    fn recover(&mut self) -> Result<()> {
        self.record(Call::Recover);
        Ok(())
    }

    fn enum_emu_snr(&mut self) -> Result<Vec<u32>> {
        Ok(alloc::vec![682000001, 682000002])
    }

    fn version(&mut self) -> Result<String> {
        Ok(String::from("mock 1.0"))
    }
}

/// Factory whose probes all share one log and one attached device
pub struct MockFactory {
    pub device_family: DeviceFamily,
    pub version: &'static str,
    pub log: CallLog,
}

impl MockFactory {
    pub fn new(device_family: DeviceFamily, version: &'static str) -> Self {
        Self {
            device_family,
            version,
            log: Rc::default(),
        }
    }

    pub fn calls(&self, family: DeviceFamily, call: &Call) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|(f, c)| *f == family && c == call)
            .count()
    }
}

impl ProbeFactory for MockFactory {
    type Probe = MockProbe;

    fn create(&mut self, family: DeviceFamily) -> Result<MockProbe> {
        let mut probe = MockProbe::new(family, self.version);
        probe.device_family = self.device_family;
        probe.log = self.log.clone();
        Ok(probe)
    }
}
