//! OpenOCD probe driver
//!
//! Drives an nRF5x target through a running OpenOCD server. Memory is
//! accessed with `read_memory`/`write_memory` and core registers with
//! `get_reg`/`set_reg` (OpenOCD 0.12 or newer). Flash and UICR are
//! programmed by driving the NVMC directly.

use std::thread;
use std::time::Duration;

use nrfprog_core::device::{DeviceDatabase, DeviceFamily, DeviceVersion, FICR_START};
use nrfprog_core::error::{Error as CoreError, ProbeFailure, Result as CoreResult};
use nrfprog_core::probe::{CpuRegister, ProbeDriver, ProtectionLevel};
use nrfprog_core::protocol::{self as nvmc, MemoryAccess};

use crate::error::{to_core, OpenOcdError, Result};
use crate::protocol::{format_values, parse_reg_value, parse_u32, parse_values, TclClient};
use crate::transport::Transport;

/// Cortex-M CPUID register
const CPUID: u32 = 0xE000_ED00;
/// CPUID part number of the Cortex-M0 used in nRF51 devices
const CORTEX_M0_PARTNO: u32 = 0xC20;

/// nRF52 FICR INFO.PART, e.g. 0x52832
const NRF52_INFO_PART: u32 = FICR_START + 0x100;
/// nRF52 FICR INFO.VARIANT, four ASCII characters, e.g. "AAB0"
const NRF52_INFO_VARIANT: u32 = FICR_START + 0x104;

/// nRF51 FICR CODEPAGESIZE
const NRF51_CODEPAGESIZE: u32 = FICR_START + 0x10;
/// nRF51 FICR CODESIZE (in pages)
const NRF51_CODESIZE: u32 = FICR_START + 0x14;
/// nRF51 FICR NUMRAMBLOCK
const NRF51_NUMRAMBLOCK: u32 = FICR_START + 0x34;
/// nRF51 FICR SIZERAMBLOCKS
const NRF51_SIZERAMBLOCKS: u32 = FICR_START + 0x38;

/// nRF51 UICR RBPCONF
const NRF51_RBPCONF: u32 = 0x1000_1004;
/// nRF52 UICR APPROTECT
const NRF52_APPROTECT: u32 = 0x1000_1208;

/// nRF52 CTRL-AP index and registers
const CTRL_AP: u32 = 1;
const CTRL_AP_RESET: u32 = 0x00;
const CTRL_AP_ERASEALL: u32 = 0x04;
const CTRL_AP_ERASEALLSTATUS: u32 = 0x08;

/// Polls of ERASEALLSTATUS before giving up, 10 ms apart
const ERASEALL_POLLS: u32 = 500;

/// Connection settings for the OpenOCD server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOcdConfig {
    /// Server host
    pub host: String,
    /// TCL RPC port
    pub port: u16,
    /// DAP name used for CTRL-AP access during recover
    pub dap: String,
}

impl Default for OpenOcdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: crate::protocol::DEFAULT_PORT,
            dap: "nrf52.dap".to_string(),
        }
    }
}

impl OpenOcdConfig {
    /// Build a configuration from `key=value` probe parameters
    ///
    /// Known keys: `host`, `port`, `dap`.
    pub fn from_params<'a, I>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            match key {
                "host" => config.host = value.to_string(),
                "port" => {
                    config.port = value.parse().map_err(|_| {
                        OpenOcdError::InvalidParameter(format!("invalid port: {}", value))
                    })?
                }
                "dap" => config.dap = value.to_string(),
                _ => {
                    return Err(OpenOcdError::InvalidParameter(format!(
                        "unknown parameter: {}",
                        key
                    )))
                }
            }
        }
        Ok(config)
    }
}

/// OpenOCD-backed probe driver for one device family
pub struct OpenOcd<T: Transport> {
    family: DeviceFamily,
    config: OpenOcdConfig,
    client: TclClient<T>,
    db: DeviceDatabase,
    open: bool,
    connected: bool,
}

impl<T: Transport> OpenOcd<T> {
    /// Create an unopened driver
    ///
    /// `db` is used to name nRF51 variants, which can only be told apart by
    /// their memory geometry.
    pub fn new(family: DeviceFamily, config: OpenOcdConfig, transport: T, db: DeviceDatabase) -> Self {
        Self {
            family,
            config,
            client: TclClient::new(transport),
            db,
            open: false,
            connected: false,
        }
    }

    fn command(&mut self, command: &str) -> Result<String> {
        if !self.open {
            return Err(OpenOcdError::NotConnected);
        }
        self.client.execute(command)
    }

    fn read_words(&mut self, addr: u32, count: usize) -> Result<Vec<u32>> {
        let reply = self.command(&format!("read_memory 0x{:x} 32 {}", addr, count))?;
        let words = parse_values(&reply)?;
        if words.len() != count {
            return Err(OpenOcdError::InvalidResponse(format!(
                "expected {} words, got {}",
                count,
                words.len()
            )));
        }
        Ok(words)
    }

    fn read_word(&mut self, addr: u32) -> Result<u32> {
        Ok(self.read_words(addr, 1)?[0])
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        self.command(&format!("write_memory 0x{:x} 32 {}", addr, format_values([value])))?;
        Ok(())
    }

    fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let reply = self.command(&format!("read_memory 0x{:x} 8 {}", addr, buf.len()))?;
        let values = parse_values(&reply)?;
        if values.len() != buf.len() {
            return Err(OpenOcdError::InvalidResponse(format!(
                "expected {} bytes, got {}",
                buf.len(),
                values.len()
            )));
        }
        for (dst, v) in buf.iter_mut().zip(values) {
            *dst = v as u8;
        }
        Ok(())
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let values = format_values(data.iter().map(|&b| b as u32));
        self.command(&format!("write_memory 0x{:x} 8 {}", addr, values))?;
        Ok(())
    }

    fn require_connected(&self) -> CoreResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ProbeFailure::DeviceConnectFailed.into())
        }
    }

    /// Run an NVMC sequence with the core halted
    fn with_nvmc<F>(&mut self, addr: u32, op: F) -> CoreResult<()>
    where
        F: FnOnce(&mut NvmcBus<'_, T>) -> CoreResult<()>,
    {
        self.require_connected()?;
        self.command("halt")
            .map_err(|e| to_core(e, ProbeFailure::WriteFailed { addr }))?;
        op(&mut NvmcBus { probe: self })
    }

    fn identify_nrf52(&mut self) -> Result<Option<DeviceVersion>> {
        let part = match self.read_word(NRF52_INFO_PART) {
            Ok(part) => part,
            Err(OpenOcdError::CommandFailed { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if part == 0xFFFF_FFFF || part >> 12 != 0x52 {
            return Ok(None);
        }
        let variant = self.read_word(NRF52_INFO_VARIANT)?.to_be_bytes();
        let variant: String = variant[..2]
            .iter()
            .map(|&b| if b.is_ascii_alphanumeric() { b as char } else { '?' })
            .collect();
        Ok(Some(DeviceVersion::new(&format!(
            "NRF{:X}_xx{}_REV1",
            part, variant
        ))))
    }

    fn identify_nrf51(&mut self) -> Result<Option<DeviceVersion>> {
        let cpuid = self.read_word(CPUID)?;
        if (cpuid >> 4) & 0xFFF != CORTEX_M0_PARTNO {
            return Ok(None);
        }
        let page_size = self.read_word(NRF51_CODEPAGESIZE)?;
        let code_pages = self.read_word(NRF51_CODESIZE)?;
        let ram_blocks = self.read_word(NRF51_NUMRAMBLOCK)?;
        let ram_block_size = self.read_word(NRF51_SIZERAMBLOCKS)?;
        let flash_size = page_size.wrapping_mul(code_pages);
        let ram_size = ram_blocks.wrapping_mul(ram_block_size);

        match self
            .db
            .find_by_geometry(DeviceFamily::Nrf51, flash_size, ram_size)
        {
            Some(entry) => Ok(Some(entry.version.clone())),
            None => {
                log::warn!(
                    "No nRF51 variant with {} KiB flash and {} KiB RAM",
                    flash_size / 1024,
                    ram_size / 1024
                );
                Ok(Some(DeviceVersion::new("NRF51_UNKNOWN")))
            }
        }
    }

    fn ctrl_ap_write(&mut self, reg: u32, value: u32) -> Result<()> {
        let cmd = format!("{} apreg {} 0x{:x} {}", self.config.dap, CTRL_AP, reg, value);
        self.command(&cmd)?;
        Ok(())
    }

    fn ctrl_ap_read(&mut self, reg: u32) -> Result<u32> {
        let cmd = format!("{} apreg {} 0x{:x}", self.config.dap, CTRL_AP, reg);
        parse_u32(&self.command(&cmd)?)
    }

    fn recover_nrf52(&mut self) -> Result<()> {
        self.ctrl_ap_write(CTRL_AP_ERASEALL, 1)?;
        let mut done = false;
        for _ in 0..ERASEALL_POLLS {
            if self.ctrl_ap_read(CTRL_AP_ERASEALLSTATUS)? == 0 {
                done = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.ctrl_ap_write(CTRL_AP_ERASEALL, 0)?;
        if !done {
            return Err(OpenOcdError::InvalidResponse(
                "CTRL-AP ERASEALL did not complete".to_string(),
            ));
        }
        self.ctrl_ap_write(CTRL_AP_RESET, 1)?;
        self.ctrl_ap_write(CTRL_AP_RESET, 0)?;
        self.command("reset halt")?;
        Ok(())
    }
}

/// Raw word access through OpenOCD for the NVMC helpers
struct NvmcBus<'a, T: Transport> {
    probe: &'a mut OpenOcd<T>,
}

impl<T: Transport> MemoryAccess for NvmcBus<'_, T> {
    fn read_u32(&mut self, addr: u32) -> CoreResult<u32> {
        self.probe
            .read_word(addr)
            .map_err(|e| to_core(e, ProbeFailure::ReadFailed { addr }))
    }

    fn write_u32(&mut self, addr: u32, value: u32) -> CoreResult<()> {
        self.probe
            .write_word(addr, value)
            .map_err(|e| to_core(e, ProbeFailure::WriteFailed { addr }))
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }
}

/// OpenOCD name of a core register
fn register_name(reg: CpuRegister) -> &'static str {
    match reg {
        CpuRegister::R0 => "r0",
        CpuRegister::R1 => "r1",
        CpuRegister::R2 => "r2",
        CpuRegister::R3 => "r3",
        CpuRegister::R4 => "r4",
        CpuRegister::R5 => "r5",
        CpuRegister::R6 => "r6",
        CpuRegister::R7 => "r7",
        CpuRegister::R8 => "r8",
        CpuRegister::R9 => "r9",
        CpuRegister::R10 => "r10",
        CpuRegister::R11 => "r11",
        CpuRegister::R12 => "r12",
        CpuRegister::Sp => "sp",
        CpuRegister::Lr => "lr",
        CpuRegister::Pc => "pc",
        CpuRegister::Xpsr => "xPSR",
        CpuRegister::Msp => "msp",
        CpuRegister::Psp => "psp",
    }
}

fn transfer(e: OpenOcdError) -> CoreError {
    to_core(e, ProbeFailure::Transfer)
}

impl<T: Transport> ProbeDriver for OpenOcd<T> {
    fn family(&self) -> DeviceFamily {
        self.family
    }

    fn open(&mut self) -> CoreResult<()> {
        self.client
            .open()
            .map_err(|e| to_core(e, ProbeFailure::OpenFailed))?;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        self.open = false;
        self.connected = false;
        self.client.close().map_err(transfer)
    }

    fn connect_to_emu_with_snr(&mut self, serial: u32, clock_khz: u32) -> CoreResult<()> {
        // OpenOCD picks its adapter at startup (`adapter serial`)
        log::info!(
            "Using the adapter OpenOCD was started with; serial {} is not selectable",
            serial
        );
        self.connect_to_emu_without_snr(clock_khz)
    }

    fn connect_to_emu_without_snr(&mut self, clock_khz: u32) -> CoreResult<()> {
        self.command(&format!("adapter speed {}", clock_khz))
            .map_err(|e| to_core(e, ProbeFailure::EmulatorConnectFailed))?;
        self.connected = true;
        Ok(())
    }

    fn disconnect_from_emu(&mut self) -> CoreResult<()> {
        self.connected = false;
        Ok(())
    }

    fn read_device_version(&mut self) -> CoreResult<DeviceVersion> {
        self.require_connected()?;
        let version = match self.family {
            DeviceFamily::Nrf52 => self.identify_nrf52(),
            DeviceFamily::Nrf51 => self.identify_nrf51(),
        }
        .map_err(|e| to_core(e, ProbeFailure::DeviceConnectFailed))?;

        version.ok_or_else(|| ProbeFailure::WrongFamily.into())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> CoreResult<()> {
        self.require_connected()?;
        self.read_bytes(addr, buf)
            .map_err(|e| to_core(e, ProbeFailure::ReadFailed { addr }))
    }

    fn write(&mut self, addr: u32, data: &[u8], flash: bool) -> CoreResult<()> {
        if flash {
            self.with_nvmc(addr, |bus| nvmc::write_bytes(bus, addr, data))
        } else {
            self.require_connected()?;
            self.write_bytes(addr, data)
                .map_err(|e| to_core(e, ProbeFailure::WriteFailed { addr }))
        }
    }

    fn read_u32(&mut self, addr: u32) -> CoreResult<u32> {
        self.require_connected()?;
        self.read_word(addr)
            .map_err(|e| to_core(e, ProbeFailure::ReadFailed { addr }))
    }

    fn write_u32(&mut self, addr: u32, value: u32, flash: bool) -> CoreResult<()> {
        if flash {
            self.with_nvmc(addr, |bus| nvmc::write_words(bus, addr, &[value]))
        } else {
            self.require_connected()?;
            self.write_word(addr, value)
                .map_err(|e| to_core(e, ProbeFailure::WriteFailed { addr }))
        }
    }

    fn erase_all(&mut self) -> CoreResult<()> {
        self.with_nvmc(0, |bus| nvmc::erase_all(bus))
    }

    fn erase_page(&mut self, addr: u32) -> CoreResult<()> {
        self.with_nvmc(addr, |bus| nvmc::erase_page(bus, addr))
    }

    fn erase_uicr(&mut self) -> CoreResult<()> {
        self.with_nvmc(nvmc::regs::ERASEUICR, |bus| nvmc::erase_uicr(bus))
    }

    fn debug_reset(&mut self) -> CoreResult<()> {
        self.require_connected()?;
        self.command("soft_reset_halt").map_err(transfer)?;
        Ok(())
    }

    fn pin_reset(&mut self) -> CoreResult<()> {
        self.require_connected()?;
        self.command("adapter assert srst").map_err(transfer)?;
        thread::sleep(Duration::from_millis(10));
        self.command("adapter deassert srst").map_err(transfer)?;
        self.command("halt").map_err(transfer)?;
        Ok(())
    }

    fn sys_reset(&mut self) -> CoreResult<()> {
        self.require_connected()?;
        self.command("reset halt").map_err(transfer)?;
        Ok(())
    }

    fn halt(&mut self) -> CoreResult<()> {
        self.require_connected()?;
        self.command("halt").map_err(transfer)?;
        Ok(())
    }

    fn go(&mut self) -> CoreResult<()> {
        self.require_connected()?;
        self.command("resume").map_err(transfer)?;
        Ok(())
    }

    fn run(&mut self, pc: u32, sp: u32) -> CoreResult<()> {
        self.require_connected()?;
        self.command("halt").map_err(transfer)?;
        self.command(&format!("set_reg {{pc 0x{:x} sp 0x{:x}}}", pc, sp))
            .map_err(transfer)?;
        self.command("resume").map_err(transfer)?;
        Ok(())
    }

    fn read_cpu_register(&mut self, reg: CpuRegister) -> CoreResult<u32> {
        self.require_connected()?;
        let name = register_name(reg);
        let reply = self
            .command(&format!("get_reg {{{}}}", name))
            .map_err(transfer)?;
        parse_reg_value(&reply, name).map_err(transfer)
    }

    fn readback_protect(&mut self, level: ProtectionLevel) -> CoreResult<()> {
        let (addr, value) = match (self.family, level) {
            (DeviceFamily::Nrf51, ProtectionLevel::Region0) => (NRF51_RBPCONF, 0xFFFF_FF00),
            (DeviceFamily::Nrf51, ProtectionLevel::All) => (NRF51_RBPCONF, 0xFFFF_00FF),
            (DeviceFamily::Nrf52, ProtectionLevel::All) => (NRF52_APPROTECT, 0xFFFF_FF00),
            (DeviceFamily::Nrf52, ProtectionLevel::Region0) => {
                return Err(ProbeFailure::Unsupported("region 0 protection").into())
            }
        };
        self.with_nvmc(addr, |bus| nvmc::write_words(bus, addr, &[value]))
    }

    fn recover(&mut self) -> CoreResult<()> {
        self.require_connected()?;
        match self.family {
            DeviceFamily::Nrf52 => self
                .recover_nrf52()
                .map_err(|e| to_core(e, ProbeFailure::EraseFailed { addr: 0 })),
            DeviceFamily::Nrf51 => {
                self.with_nvmc(0, |bus| nvmc::erase_all(bus))?;
                self.command("reset halt").map_err(transfer)?;
                Ok(())
            }
        }
    }

    fn enum_emu_snr(&mut self) -> CoreResult<Vec<u32>> {
        // The server exposes exactly the adapter it was started with and
        // has no way to list others
        log::info!("OpenOCD does not enumerate adapters");
        Ok(Vec::new())
    }

    fn version(&mut self) -> CoreResult<String> {
        self.command("version").map_err(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::ScriptedTransport;

    fn probe(family: DeviceFamily, transport: ScriptedTransport) -> OpenOcd<ScriptedTransport> {
        let mut probe = OpenOcd::new(
            family,
            OpenOcdConfig::default(),
            transport,
            DeviceDatabase::builtin(),
        );
        probe.open().unwrap();
        probe.connect_to_emu_without_snr(4000).unwrap();
        probe
    }

    fn commands(probe: &mut OpenOcd<ScriptedTransport>) -> Vec<String> {
        probe.client.transport_mut().commands()
    }

    #[test]
    fn test_config_from_params() {
        let config =
            OpenOcdConfig::from_params([("host", "10.0.0.2"), ("port", "7777")]).unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 7777);
        assert_eq!(config.dap, "nrf52.dap");
        assert!(OpenOcdConfig::from_params([("port", "x")]).is_err());
        assert!(OpenOcdConfig::from_params([("speed", "1")]).is_err());
    }

    #[test]
    fn test_identify_nrf52() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}") // adapter speed
            .reply("0 0x52832") // INFO.PART
            .reply("0 0x41414230"); // INFO.VARIANT "AAB0"
        let mut probe = probe(DeviceFamily::Nrf52, t);
        let version = probe.read_device_version().unwrap();
        assert_eq!(version.as_str(), "NRF52832_xxAA_REV1");
        assert_eq!(
            commands(&mut probe),
            vec![
                "adapter speed 4000",
                "read_memory 0x10000100 32 1",
                "read_memory 0x10000104 32 1",
            ]
        );
    }

    #[test]
    fn test_nrf51_is_wrong_family_for_nrf52_probe() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}").reply("0 0xffffffff");
        let mut probe = probe(DeviceFamily::Nrf52, t);
        assert!(probe.read_device_version().unwrap_err().is_wrong_family());
    }

    #[test]
    fn test_identify_nrf51_by_geometry() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}")
            .reply("0 0x410cc200") // CPUID, Cortex-M0
            .reply("0 0x400") // CODEPAGESIZE
            .reply("0 0x100") // CODESIZE
            .reply("0 0x4") // NUMRAMBLOCK
            .reply("0 0x2000"); // SIZERAMBLOCKS
        let mut probe = probe(DeviceFamily::Nrf51, t);
        let version = probe.read_device_version().unwrap();
        assert_eq!(version.as_str(), "NRF51_XLR3P");
    }

    #[test]
    fn test_cortex_m4_is_not_nrf51() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}").reply("0 0x410fc241");
        let mut probe = probe(DeviceFamily::Nrf51, t);
        assert!(probe.read_device_version().unwrap_err().is_wrong_family());
    }

    #[test]
    fn test_read_bytes() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}").reply("0 {0x0 0x20 0x0 0x20}");
        let mut probe = probe(DeviceFamily::Nrf52, t);
        let mut buf = [0u8; 4];
        probe.read(0x2000_0000, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x20, 0x00, 0x20]);
    }

    #[test]
    fn test_failed_read_maps_to_read_failure() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}").reply("1 {read_memory: failed to read memory}");
        let mut probe = probe(DeviceFamily::Nrf52, t);
        let mut buf = [0u8; 4];
        assert_eq!(
            probe.read(0x5000_0000, &mut buf),
            Err(CoreError::Probe(ProbeFailure::ReadFailed { addr: 0x5000_0000 }))
        );
    }

    #[test]
    fn test_flash_word_write_goes_through_nvmc() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}") // adapter speed
            .reply("0 {}") // halt
            .reply("0 {}") // CONFIG = WEN
            .reply("0 0x1") // READY
            .reply("0 {}") // word
            .reply("0 0x1") // READY
            .reply("0 {}") // CONFIG = REN
            .reply("0 0x1"); // READY
        let mut probe = probe(DeviceFamily::Nrf52, t);
        probe.write_u32(0x1000, 0xCAFE_F00D, true).unwrap();
        assert_eq!(
            commands(&mut probe)[1..],
            [
                "halt",
                "write_memory 0x4001e504 32 {0x1}",
                "read_memory 0x4001e400 32 1",
                "write_memory 0x1000 32 {0xcafef00d}",
                "read_memory 0x4001e400 32 1",
                "write_memory 0x4001e504 32 {0x0}",
                "read_memory 0x4001e400 32 1",
            ]
        );
    }

    #[test]
    fn test_run_sets_pc_and_sp() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}");
        let mut probe = probe(DeviceFamily::Nrf51, t);
        probe.run(0xC0, 0x2000_4000).unwrap();
        assert_eq!(
            commands(&mut probe)[1..],
            ["halt", "set_reg {pc 0xc0 sp 0x20004000}", "resume"]
        );
    }

    #[test]
    fn test_read_register() {
        let mut t = ScriptedTransport::default();
        t.reply("0 {}").reply("0 {xPSR 0x01000000}");
        let mut probe = probe(DeviceFamily::Nrf52, t);
        assert_eq!(
            probe.read_cpu_register(CpuRegister::Xpsr).unwrap(),
            0x0100_0000
        );
    }

    #[test]
    fn test_requires_connection() {
        let mut probe = OpenOcd::new(
            DeviceFamily::Nrf52,
            OpenOcdConfig::default(),
            ScriptedTransport::default(),
            DeviceDatabase::builtin(),
        );
        probe.open().unwrap();
        assert_eq!(
            probe.halt(),
            Err(CoreError::Probe(ProbeFailure::DeviceConnectFailed))
        );
    }
}
