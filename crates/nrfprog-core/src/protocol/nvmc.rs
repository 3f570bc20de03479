//! NVMC (Non-Volatile Memory Controller) command sequences
//!
//! Backends that only offer raw word access to the target bus (an OpenOCD
//! server, a bare SWD adapter) program code flash and UICR by driving the
//! NVMC registers directly. nRF51 and nRF52 share the same register layout.
//!
//! Every sequence leaves the controller in read-only mode, including when
//! a step fails.

use alloc::vec::Vec;

use crate::device::ERASED_VALUE;
use crate::error::{Error, Result};

/// NVMC register addresses
pub mod regs {
    /// Ready flag, bit 0 set when the controller is idle
    pub const READY: u32 = 0x4001_E400;
    /// Access mode
    pub const CONFIG: u32 = 0x4001_E504;
    /// Erase the page whose address is written here
    pub const ERASEPAGE: u32 = 0x4001_E508;
    /// Erase all code flash and UICR when 1 is written
    pub const ERASEALL: u32 = 0x4001_E50C;
    /// Erase the UICR page when 1 is written
    pub const ERASEUICR: u32 = 0x4001_E514;
}

/// NVMC access mode, the value written to `CONFIG`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NvmcMode {
    /// Read only
    ReadOnly = 0,
    /// Write enabled
    WriteEnable = 1,
    /// Erase enabled
    EraseEnable = 2,
}

/// Word-level access to the target bus
pub trait MemoryAccess {
    /// Read a 32-bit word
    fn read_u32(&mut self, addr: u32) -> Result<u32>;

    /// Write a 32-bit word with a plain bus write
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Sleep between ready polls
    fn delay_us(&mut self, us: u32);
}

impl<M: MemoryAccess + ?Sized> MemoryAccess for &mut M {
    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        (**self).read_u32(addr)
    }

    fn write_u32(&mut self, addr: u32, value: u32) -> Result<()> {
        (**self).write_u32(addr, value)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Poll delay while waiting for a word write
const WRITE_POLL_US: u32 = 10;
/// Upper bound for a word write (nominal 41us on nRF52)
const WRITE_TIMEOUT_US: u32 = 10_000;
/// Poll delay while waiting for an erase
const ERASE_POLL_US: u32 = 1_000;
/// Upper bound for a page or UICR erase (nominal 85ms on nRF52)
const PAGE_ERASE_TIMEOUT_US: u32 = 500_000;
/// Upper bound for a full erase (nominal 200ms on nRF52840)
const ERASE_ALL_TIMEOUT_US: u32 = 2_000_000;

/// Wait for the READY flag
///
/// Returns `Error::Timeout` if the controller is still busy after
/// `timeout_us`.
pub fn wait_ready<M: MemoryAccess + ?Sized>(
    mem: &mut M,
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let max_polls = if poll_delay_us > 0 {
        timeout_us / poll_delay_us
    } else {
        timeout_us
    };

    for _ in 0..=max_polls {
        if mem.read_u32(regs::READY)? & 1 != 0 {
            return Ok(());
        }
        if poll_delay_us > 0 {
            mem.delay_us(poll_delay_us);
        }
    }

    Err(Error::Timeout)
}

/// Switch the access mode
pub fn set_mode<M: MemoryAccess + ?Sized>(mem: &mut M, mode: NvmcMode) -> Result<()> {
    mem.write_u32(regs::CONFIG, mode as u32)?;
    wait_ready(mem, WRITE_POLL_US, WRITE_TIMEOUT_US)
}

/// Run `op` in `mode`, then switch back to read-only
///
/// The first error wins; the mode is restored either way.
fn with_mode<M, F>(mem: &mut M, mode: NvmcMode, op: F) -> Result<()>
where
    M: MemoryAccess + ?Sized,
    F: FnOnce(&mut M) -> Result<()>,
{
    let result = set_mode(mem, mode).and_then(|()| op(mem));
    let restore = set_mode(mem, NvmcMode::ReadOnly);
    result.and(restore)
}

/// Erase all code flash and UICR
pub fn erase_all<M: MemoryAccess + ?Sized>(mem: &mut M) -> Result<()> {
    log::debug!("NVMC: erase all");
    with_mode(mem, NvmcMode::EraseEnable, |mem| {
        mem.write_u32(regs::ERASEALL, 1)?;
        wait_ready(mem, ERASE_POLL_US, ERASE_ALL_TIMEOUT_US)
    })
}

/// Erase the code flash page starting at `addr`
pub fn erase_page<M: MemoryAccess + ?Sized>(mem: &mut M, addr: u32) -> Result<()> {
    log::debug!("NVMC: erase page 0x{:08X}", addr);
    with_mode(mem, NvmcMode::EraseEnable, |mem| {
        mem.write_u32(regs::ERASEPAGE, addr)?;
        wait_ready(mem, ERASE_POLL_US, PAGE_ERASE_TIMEOUT_US)
    })
}

/// Erase the UICR page
pub fn erase_uicr<M: MemoryAccess + ?Sized>(mem: &mut M) -> Result<()> {
    log::debug!("NVMC: erase UICR");
    with_mode(mem, NvmcMode::EraseEnable, |mem| {
        mem.write_u32(regs::ERASEUICR, 1)?;
        wait_ready(mem, ERASE_POLL_US, PAGE_ERASE_TIMEOUT_US)
    })
}

/// Program consecutive words starting at the word-aligned `addr`
pub fn write_words<M: MemoryAccess + ?Sized>(mem: &mut M, addr: u32, words: &[u32]) -> Result<()> {
    with_mode(mem, NvmcMode::WriteEnable, |mem| {
        for (i, word) in words.iter().enumerate() {
            mem.write_u32(addr + (i as u32) * 4, *word)?;
            wait_ready(mem, WRITE_POLL_US, WRITE_TIMEOUT_US)?;
        }
        Ok(())
    })
}

/// Pack bytes into little-endian words covering `[addr, addr + len)`
///
/// Bytes outside the data but inside the first or last word are filled
/// with the erased value, which leaves those flash cells unchanged.
/// Returns the aligned start address and the words.
pub fn pack_words(addr: u32, data: &[u8]) -> (u32, Vec<u32>) {
    let start = addr & !3;
    let end = addr + data.len() as u32;
    let mut words = Vec::with_capacity(((end - start) as usize + 3) / 4);

    let mut word_addr = start;
    while word_addr < end {
        let mut bytes = [ERASED_VALUE; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            let a = word_addr + i as u32;
            if a >= addr && a < end {
                *b = data[(a - addr) as usize];
            }
        }
        words.push(u32::from_le_bytes(bytes));
        word_addr += 4;
    }

    (start, words)
}

/// Program arbitrary bytes, padding partial words with the erased value
pub fn write_bytes<M: MemoryAccess + ?Sized>(mem: &mut M, addr: u32, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let (start, words) = pack_words(addr, data);
    log::trace!("NVMC: write {} words at 0x{:08X}", words.len(), start);
    write_words(mem, start, &words)
}
