//! Memory operations on a connected device

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write;

use super::dump::{write_lines, write_section_header, DUMP_ORDER};
use super::{
    BlankCheck, DumpSelection, EraseMode, EraseStrategy, MemorySegment, ProgramOptions,
    ProgramStats, Progress,
};
use crate::device::{DeviceDescriptor, DeviceFamily, Region, ERASED_VALUE};
use crate::error::{Error, Result, UsageError, VerifyFailure};
use crate::probe::{CpuRegister, ProbeDriver, ProtectionLevel};

/// Largest single read or write issued to the probe
pub const TRANSFER_CHUNK_SIZE: usize = 4096;

/// UICR PSELRESET registers, both must hold the reset pin number
pub const PSELRESET: [u32; 2] = [0x1000_1200, 0x1000_1204];

/// Reset pin number on nRF52 (P0.21)
pub const NRF52_RESET_PIN: u32 = 21;

/// Memory operation engine bound to one connected device
///
/// Obtained from [`DeviceSession::memory`](crate::session::DeviceSession::memory).
pub struct Memory<'a, P: ProbeDriver + ?Sized> {
    probe: &'a mut P,
    device: &'a DeviceDescriptor,
}

impl<'a, P: ProbeDriver + ?Sized> Memory<'a, P> {
    /// Bind the engine to a probe and the descriptor of the device behind it
    pub fn new(probe: &'a mut P, device: &'a DeviceDescriptor) -> Self {
        Self { probe, device }
    }

    /// Descriptor of the connected device
    pub fn device(&self) -> &DeviceDescriptor {
        self.device
    }

    /// Erase all flash, one page, or the UICR
    pub fn erase(&mut self, mode: EraseMode) -> Result<()> {
        match mode {
            EraseMode::All => {
                log::debug!("Erasing all flash and UICR");
                self.probe.erase_all()
            }
            EraseMode::Page(addr) => {
                self.check_page(addr)?;
                log::debug!("Erasing page at 0x{:08X}", addr);
                self.probe.erase_page(addr)
            }
            EraseMode::Uicr => {
                log::debug!("Erasing UICR");
                self.probe.erase_uicr()
            }
        }
    }

    fn check_page(&self, addr: u32) -> Result<()> {
        let page_size = self.device.page_size;
        if addr % page_size != 0 {
            return Err(UsageError::UnalignedPage { addr, page_size }.into());
        }
        let num_pages = self.device.num_flash_pages;
        if self.device.page_index(addr) >= num_pages {
            return Err(UsageError::PageOutOfRange { addr, num_pages }.into());
        }
        Ok(())
    }

    /// Classify every segment, rejecting anything outside flash and UICR
    fn classify_segments(&self, segments: &[MemorySegment]) -> Result<Vec<Region>> {
        segments
            .iter()
            .map(|seg| {
                if seg.is_empty() {
                    return Err(UsageError::EmptySegment { addr: seg.address }.into());
                }
                let len = seg.len() as u32;
                match self.device.region_of_range(seg.address, len) {
                    region @ (Region::Flash | Region::Uicr) => Ok(region),
                    _ => Err(UsageError::SegmentOutOfRange {
                        addr: seg.address,
                        len,
                    }
                    .into()),
                }
            })
            .collect()
    }

    /// Program image segments
    ///
    /// All segments are validated first. Then, in segment order: erase the
    /// touched pages (if the strategy asks for it), blank check, write with
    /// the flash path and, if requested, read back and compare. The first
    /// failure aborts the operation.
    pub fn program<R: Progress + ?Sized>(
        &mut self,
        segments: &[MemorySegment],
        options: &ProgramOptions,
        progress: &mut R,
    ) -> Result<ProgramStats> {
        let regions = self.classify_segments(segments)?;
        let mut stats = ProgramStats::default();
        let mut uicr_erased = false;

        match options.erase {
            EraseStrategy::All => {
                log::info!("Erasing all flash and UICR");
                self.probe.erase_all()?;
                stats.erased_all = true;
            }
            EraseStrategy::SectorsAndUicr => {
                log::info!("Erasing UICR");
                self.probe.erase_uicr()?;
                uicr_erased = true;
                stats.pages_erased += 1;
            }
            _ => {}
        }

        let total: usize = segments.iter().map(MemorySegment::len).sum();
        progress.writing(total);
        let mut written = 0;

        for (seg, region) in segments.iter().zip(regions) {
            log::debug!(
                "Programming {} bytes at 0x{:08X} ({})",
                seg.len(),
                seg.address,
                region
            );

            if options.erase.erases_sectors() {
                if region == Region::Uicr {
                    if !uicr_erased {
                        self.probe.erase_uicr()?;
                        uicr_erased = true;
                        stats.pages_erased += 1;
                    }
                } else {
                    stats.pages_erased += self.erase_pages_of(seg)?;
                }
            }

            if options.blank_check == BlankCheck::Required {
                self.check_erased(seg)?;
            }

            for (i, chunk) in seg.data.chunks(TRANSFER_CHUNK_SIZE).enumerate() {
                let addr = seg.address + (i * TRANSFER_CHUNK_SIZE) as u32;
                self.probe.write(addr, chunk, true)?;
                written += chunk.len();
                progress.write_progress(written);
            }

            if options.verify {
                self.compare(seg)?;
            }

            stats.segments += 1;
            stats.bytes_written += seg.len();
        }

        progress.complete(&stats);
        Ok(stats)
    }

    /// Erase the inclusive page range a flash segment touches
    fn erase_pages_of(&mut self, seg: &MemorySegment) -> Result<usize> {
        let page_size = self.device.page_size;
        let first = self.device.page_index(seg.address);
        let last = self.device.page_index(seg.address + seg.len() as u32 - 1);
        for page in first..=last {
            log::debug!("Erasing page at 0x{:08X}", page * page_size);
            self.probe.erase_page(page * page_size)?;
        }
        Ok((last - first + 1) as usize)
    }

    fn read_chunked(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        for (i, chunk) in buf.chunks_mut(TRANSFER_CHUNK_SIZE).enumerate() {
            self.probe
                .read(addr + (i * TRANSFER_CHUNK_SIZE) as u32, chunk)?;
        }
        Ok(())
    }

    fn check_erased(&mut self, seg: &MemorySegment) -> Result<()> {
        let mut current = vec![0u8; seg.len()];
        self.read_chunked(seg.address, &mut current)?;
        match current.iter().position(|&b| b != ERASED_VALUE) {
            Some(offset) => Err(Error::NotErased {
                addr: seg.address + offset as u32,
                found: current[offset],
            }),
            None => Ok(()),
        }
    }

    fn compare(&mut self, seg: &MemorySegment) -> Result<()> {
        let mut current = vec![0u8; seg.len()];
        self.read_chunked(seg.address, &mut current)?;
        let mismatch = current
            .iter()
            .zip(seg.data.iter())
            .position(|(found, expected)| found != expected);
        match mismatch {
            Some(offset) => Err(Error::Verify(VerifyFailure {
                segment: seg.address,
                addr: seg.address + offset as u32,
                expected: seg.data[offset],
                found: current[offset],
            })),
            None => Ok(()),
        }
    }

    /// Compare the device against image segments
    ///
    /// Stops at the first mismatch.
    pub fn verify<R: Progress + ?Sized>(
        &mut self,
        segments: &[MemorySegment],
        progress: &mut R,
    ) -> Result<()> {
        let total: usize = segments.iter().map(MemorySegment::len).sum();
        progress.reading(total);
        let mut done = 0;
        for seg in segments {
            log::debug!("Verifying {} bytes at 0x{:08X}", seg.len(), seg.address);
            self.compare(seg)?;
            done += seg.len();
            progress.read_progress(done);
        }
        Ok(())
    }

    /// Read `len` bytes starting at `addr`
    pub fn read(&mut self, addr: u32, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Err(UsageError::ZeroLength.into());
        }
        if addr.checked_add(len - 1).is_none() {
            return Err(UsageError::RangeOverflow { addr, len }.into());
        }
        let mut buf = vec![0u8; len as usize];
        self.read_chunked(addr, &mut buf)?;
        Ok(buf)
    }

    /// Write one word, picking the flash or RAM path from the address
    ///
    /// Returns the region the word landed in. FICR is rejected; any other
    /// address outside flash and UICR takes the plain path.
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<Region> {
        if addr % 4 != 0 {
            return Err(UsageError::UnalignedWord { addr }.into());
        }
        let region = self.device.region_of_range(addr, 4);
        if region == Region::Ficr {
            return Err(UsageError::ReadOnlyRegion { addr }.into());
        }
        log::debug!("Writing 0x{:08X} to 0x{:08X} ({})", value, addr, region);
        self.probe.write_u32(addr, value, region.is_nvm())?;
        Ok(region)
    }

    /// Dump the selected regions as text
    ///
    /// Sections appear in the order code flash, UICR, RAM, each under its
    /// header. Code flash and UICR sections are followed by two newlines,
    /// RAM by nothing.
    pub fn dump<W: Write + ?Sized, R: Progress + ?Sized>(
        &mut self,
        selection: DumpSelection,
        sink: &mut W,
        progress: &mut R,
    ) -> Result<()> {
        let selection = selection.or_default();
        let sections: Vec<(u32, u32, Region)> = DUMP_ORDER
            .iter()
            .filter(|(flag, _)| selection.contains(*flag))
            .filter_map(|&(_, region)| {
                self.device
                    .bounds(region)
                    .map(|(start, end)| (start, end, region))
            })
            .collect();

        let total: usize = sections.iter().map(|(s, e, _)| (e - s) as usize).sum();
        progress.reading(total);
        let mut done = 0;

        for (start, end, region) in &sections {
            write_section_header(sink, *region)?;

            let mut addr = *start;
            while addr < *end {
                let len = core::cmp::min(TRANSFER_CHUNK_SIZE as u32, end - addr);
                let mut buf = vec![0u8; len as usize];
                self.probe.read(addr, &mut buf)?;
                write_lines(sink, addr, &buf)?;
                addr += len;
                done += len as usize;
                progress.read_progress(done);
            }
            if *region != Region::Ram {
                sink.write_str("\n\n")?;
            }
        }
        Ok(())
    }

    /// Enable readback protection
    pub fn readback_protect(&mut self, level: ProtectionLevel) -> Result<()> {
        if level == ProtectionLevel::Region0 && self.device.family == DeviceFamily::Nrf52 {
            return Err(UsageError::UnsupportedOnFamily(DeviceFamily::Nrf52).into());
        }
        log::debug!("Enabling readback protection ({:?})", level);
        self.probe.readback_protect(level)
    }

    /// Route the reset pin in UICR and apply it with a system reset
    pub fn enable_pin_reset(&mut self) -> Result<()> {
        if self.device.family != DeviceFamily::Nrf52 {
            return Err(UsageError::UnsupportedOnFamily(self.device.family).into());
        }
        for addr in PSELRESET {
            self.probe.write_u32(addr, NRF52_RESET_PIN, true)?;
        }
        self.probe.sys_reset()
    }

    /// Read every core register, in [`CpuRegister::ALL`] order
    pub fn read_registers(&mut self) -> Result<Vec<(CpuRegister, u32)>> {
        CpuRegister::ALL
            .iter()
            .map(|&reg| Ok((reg, self.probe.read_cpu_register(reg)?)))
            .collect()
    }

    /// Halt the core
    pub fn halt(&mut self) -> Result<()> {
        self.probe.halt()
    }
}
