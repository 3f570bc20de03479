//! Probe driver trait definitions

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::device::{DeviceFamily, DeviceVersion};
use crate::error::Result;

/// Debugger clock speed used when the caller does not pick one
pub const DEFAULT_CLOCK_SPEED_KHZ: u32 = 5000;

/// Cortex-M core registers readable through the debug interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuRegister {
    /// General purpose register R0
    R0,
    /// General purpose register R1
    R1,
    /// General purpose register R2
    R2,
    /// General purpose register R3
    R3,
    /// General purpose register R4
    R4,
    /// General purpose register R5
    R5,
    /// General purpose register R6
    R6,
    /// General purpose register R7
    R7,
    /// General purpose register R8
    R8,
    /// General purpose register R9
    R9,
    /// General purpose register R10
    R10,
    /// General purpose register R11
    R11,
    /// General purpose register R12
    R12,
    /// Stack pointer (R13)
    Sp,
    /// Link register (R14)
    Lr,
    /// Program counter (R15)
    Pc,
    /// Program status register
    Xpsr,
    /// Main stack pointer
    Msp,
    /// Process stack pointer
    Psp,
}

impl CpuRegister {
    /// Every register, in display order
    pub const ALL: [CpuRegister; 19] = [
        CpuRegister::R0,
        CpuRegister::R1,
        CpuRegister::R2,
        CpuRegister::R3,
        CpuRegister::R4,
        CpuRegister::R5,
        CpuRegister::R6,
        CpuRegister::R7,
        CpuRegister::R8,
        CpuRegister::R9,
        CpuRegister::R10,
        CpuRegister::R11,
        CpuRegister::R12,
        CpuRegister::Sp,
        CpuRegister::Lr,
        CpuRegister::Pc,
        CpuRegister::Xpsr,
        CpuRegister::Msp,
        CpuRegister::Psp,
    ];

    /// Register name as printed by `readregs`
    pub fn name(self) -> &'static str {
        match self {
            CpuRegister::R0 => "R0",
            CpuRegister::R1 => "R1",
            CpuRegister::R2 => "R2",
            CpuRegister::R3 => "R3",
            CpuRegister::R4 => "R4",
            CpuRegister::R5 => "R5",
            CpuRegister::R6 => "R6",
            CpuRegister::R7 => "R7",
            CpuRegister::R8 => "R8",
            CpuRegister::R9 => "R9",
            CpuRegister::R10 => "R10",
            CpuRegister::R11 => "R11",
            CpuRegister::R12 => "R12",
            CpuRegister::Sp => "SP",
            CpuRegister::Lr => "LR",
            CpuRegister::Pc => "PC",
            CpuRegister::Xpsr => "XPSR",
            CpuRegister::Msp => "MSP",
            CpuRegister::Psp => "PSP",
        }
    }
}

impl fmt::Display for CpuRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Readback protection level
///
/// Enabling protection is one-way; only a full recover removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionLevel {
    /// Protect code region 0 (nRF51 only)
    Region0,
    /// Protect the whole device
    All,
}

/// Capability set every debug probe backend provides
///
/// The session and the memory engine only ever talk to hardware through
/// this trait, so a backend is free to use any transport (a vendor
/// library, an OpenOCD server, an in-memory emulator).
///
/// All calls block until the probe has finished. A driver instance is
/// bound to one device family for its whole lifetime: detecting a
/// different family means closing it and creating a fresh one.
///
/// ## Flash writes
///
/// `write` and `write_u32` take a `flash` flag. With `flash = true` the
/// backend runs the non-volatile programming sequence (code flash and
/// UICR); with `flash = false` it performs a plain bus write (RAM and
/// peripherals). Callers pick the flag from the address classification.
pub trait ProbeDriver {
    /// Family this driver instance was created for
    fn family(&self) -> DeviceFamily;

    /// Open the probe library
    fn open(&mut self) -> Result<()>;

    /// Close the probe library
    fn close(&mut self) -> Result<()>;

    /// Connect to the emulator with the given serial number
    fn connect_to_emu_with_snr(&mut self, serial: u32, clock_khz: u32) -> Result<()>;

    /// Connect to the first emulator found
    fn connect_to_emu_without_snr(&mut self, clock_khz: u32) -> Result<()>;

    /// Disconnect from the emulator
    fn disconnect_from_emu(&mut self) -> Result<()>;

    /// Read the device variant identifier
    ///
    /// Must fail with `ProbeFailure::WrongFamily` when the connected device
    /// is not of [`family()`](Self::family).
    fn read_device_version(&mut self) -> Result<DeviceVersion>;

    /// Read target memory into `buf`
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Write `data` to target memory
    fn write(&mut self, addr: u32, data: &[u8], flash: bool) -> Result<()>;

    /// Read one 32-bit word
    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Write one 32-bit word
    fn write_u32(&mut self, addr: u32, value: u32, flash: bool) -> Result<()> {
        self.write(addr, &value.to_le_bytes(), flash)
    }

    /// Erase all code flash and UICR
    fn erase_all(&mut self) -> Result<()>;

    /// Erase the code flash page starting at `addr`
    fn erase_page(&mut self, addr: u32) -> Result<()>;

    /// Erase the UICR page
    fn erase_uicr(&mut self) -> Result<()>;

    /// Reset the core through the debug interface, leaving it halted
    fn debug_reset(&mut self) -> Result<()>;

    /// Reset the device through the reset pin, leaving it halted
    fn pin_reset(&mut self) -> Result<()>;

    /// Request a system reset, leaving the core halted
    fn sys_reset(&mut self) -> Result<()>;

    /// Halt the core
    fn halt(&mut self) -> Result<()>;

    /// Resume the core from its current state
    fn go(&mut self) -> Result<()>;

    /// Start the core at an explicit program counter and stack pointer
    fn run(&mut self, pc: u32, sp: u32) -> Result<()>;

    /// Read a core register
    fn read_cpu_register(&mut self, reg: CpuRegister) -> Result<u32>;

    /// Enable readback protection
    fn readback_protect(&mut self, level: ProtectionLevel) -> Result<()>;

    /// Erase everything and remove readback protection
    fn recover(&mut self) -> Result<()>;

    /// Serial numbers of every emulator attached to the host
    fn enum_emu_snr(&mut self) -> Result<Vec<u32>>;

    /// Version string of the probe library or server
    fn version(&mut self) -> Result<String>;
}

/// Creates fresh probe driver instances bound to one family
pub trait ProbeFactory {
    /// Driver type produced by this factory
    type Probe: ProbeDriver;

    /// Create an unopened driver for `family`
    fn create(&mut self, family: DeviceFamily) -> Result<Self::Probe>;
}

impl<P: ProbeDriver + ?Sized> ProbeDriver for Box<P> {
    fn family(&self) -> DeviceFamily {
        (**self).family()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn connect_to_emu_with_snr(&mut self, serial: u32, clock_khz: u32) -> Result<()> {
        (**self).connect_to_emu_with_snr(serial, clock_khz)
    }

    fn connect_to_emu_without_snr(&mut self, clock_khz: u32) -> Result<()> {
        (**self).connect_to_emu_without_snr(clock_khz)
    }

    fn disconnect_from_emu(&mut self) -> Result<()> {
        (**self).disconnect_from_emu()
    }

    fn read_device_version(&mut self) -> Result<DeviceVersion> {
        (**self).read_device_version()
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8], flash: bool) -> Result<()> {
        (**self).write(addr, data, flash)
    }

    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        (**self).read_u32(addr)
    }

    fn write_u32(&mut self, addr: u32, value: u32, flash: bool) -> Result<()> {
        (**self).write_u32(addr, value, flash)
    }

    fn erase_all(&mut self) -> Result<()> {
        (**self).erase_all()
    }

    fn erase_page(&mut self, addr: u32) -> Result<()> {
        (**self).erase_page(addr)
    }

    fn erase_uicr(&mut self) -> Result<()> {
        (**self).erase_uicr()
    }

    fn debug_reset(&mut self) -> Result<()> {
        (**self).debug_reset()
    }

    fn pin_reset(&mut self) -> Result<()> {
        (**self).pin_reset()
    }

    fn sys_reset(&mut self) -> Result<()> {
        (**self).sys_reset()
    }

    fn halt(&mut self) -> Result<()> {
        (**self).halt()
    }

    fn go(&mut self) -> Result<()> {
        (**self).go()
    }

    fn run(&mut self, pc: u32, sp: u32) -> Result<()> {
        (**self).run(pc, sp)
    }

    fn read_cpu_register(&mut self, reg: CpuRegister) -> Result<u32> {
        (**self).read_cpu_register(reg)
    }

    fn readback_protect(&mut self, level: ProtectionLevel) -> Result<()> {
        (**self).readback_protect(level)
    }

    fn recover(&mut self) -> Result<()> {
        (**self).recover()
    }

    fn enum_emu_snr(&mut self) -> Result<Vec<u32>> {
        (**self).enum_emu_snr()
    }

    fn version(&mut self) -> Result<String> {
        (**self).version()
    }
}

/// Information about a probe backend
#[derive(Debug, Clone)]
pub struct ProbeInfo {
    /// Name of the backend
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Description
    pub description: &'static str,
}
