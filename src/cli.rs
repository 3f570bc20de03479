//! CLI argument parsing

use crate::probes;
use clap::{ArgGroup, Parser, Subcommand};
use nrfprog_core::device::DeviceFamily;
use nrfprog_core::probe::ProtectionLevel;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a device family name (`NRF51`, `NRF52`, any case)
pub fn parse_family(s: &str) -> Result<DeviceFamily, String> {
    s.parse()
        .map_err(|_| format!("Unknown device family: {} (expected NRF51 or NRF52)", s))
}

/// Parse a readback protection level (`CR0` or `ALL`)
fn parse_rbp_level(s: &str) -> Result<ProtectionLevel, String> {
    if s.eq_ignore_ascii_case("cr0") {
        Ok(ProtectionLevel::Region0)
    } else if s.eq_ignore_ascii_case("all") {
        Ok(ProtectionLevel::All)
    } else {
        Err(format!("Unknown protection level: {} (expected CR0 or ALL)", s))
    }
}

/// Generate dynamic help text for the probe argument
fn probe_help() -> String {
    format!("Probe to use [available: {}]", probes::probe_names_short())
}

#[derive(Parser)]
#[command(name = "nrfprog")]
#[command(author, version, about = "Programmer for Nordic nRF51/nRF52 devices", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print warnings and errors; no progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Additional device descriptors (RON file)
    #[arg(long, global = true)]
    pub device_db: Option<PathBuf>,

    /// Probe to use, with optional parameters (name:key=value,...)
    #[arg(short, long, global = true, default_value = "openocd", help = probe_help())]
    pub probe: String,

    /// Serial number of the debug probe
    #[arg(short, long, global = true, value_parser = parse_hex_u32)]
    pub snr: Option<u32>,

    /// Debug clock speed in kHz
    #[arg(short, long, global = true, value_parser = parse_hex_u32)]
    pub clockspeed: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Reset selection shared by `program` and `reset`
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct ResetArgs {
    /// Debug reset (core only)
    #[arg(short = 'd', long)]
    pub debugreset: bool,

    /// Pin reset
    #[arg(short = 'P', long)]
    pub pinreset: bool,

    /// System reset
    #[arg(short = 'r', long)]
    pub systemreset: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Erase the device
    #[command(group(ArgGroup::new("mode").args(["eraseall", "erasepage", "eraseuicr"])))]
    Erase {
        /// Erase all code flash and UICR (default)
        #[arg(short, long)]
        eraseall: bool,

        /// Erase the page starting at this address
        #[arg(long, value_parser = parse_hex_u32)]
        erasepage: Option<u32>,

        /// Erase the UICR page
        #[arg(long)]
        eraseuicr: bool,
    },

    /// Halt the CPU
    Halt,

    /// List serial numbers of attached probes
    Ids,

    /// Read memory
    Memrd {
        /// Start address
        #[arg(short, long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Number of bytes
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "4")]
        length: u32,
    },

    /// Write one 32-bit word to memory
    Memwr {
        /// Word-aligned address
        #[arg(short, long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Value to write
        #[arg(long, value_parser = parse_hex_u32)]
        val: u32,
    },

    /// Route the nRF52 reset pin in UICR
    Pinresetenable,

    /// Program a hex file
    #[command(group(ArgGroup::new("erase").args(["eraseall", "sectorserase", "sectorsanduicrerase"])))]
    Program {
        /// Intel hex file
        #[arg(short, long)]
        file: PathBuf,

        /// Erase all code flash and UICR first
        #[arg(short, long)]
        eraseall: bool,

        /// Erase the pages the image touches
        #[arg(long)]
        sectorserase: bool,

        /// Erase the pages the image touches and UICR
        #[arg(short = 'u', long)]
        sectorsanduicrerase: bool,

        /// Read back and compare after writing
        #[arg(long)]
        verify: bool,

        /// Don't check that the target range is erased before writing
        #[arg(long)]
        no_blank_check: bool,

        #[command(flatten)]
        reset: ResetArgs,
    },

    /// Enable readback protection
    Rbp {
        /// Protection level: CR0 (nRF51 only) or ALL
        #[arg(long, value_parser = parse_rbp_level)]
        rbplevel: ProtectionLevel,
    },

    /// Print the CPU registers
    Readregs,

    /// Dump memory regions to a text file
    Readtofile {
        /// Output file
        #[arg(short, long)]
        file: PathBuf,

        /// Include code flash (default if nothing is selected)
        #[arg(long)]
        readcode: bool,

        /// Include UICR
        #[arg(long)]
        readuicr: bool,

        /// Include RAM
        #[arg(long)]
        readram: bool,
    },

    /// Erase everything and remove readback protection
    Recover {
        /// Device family (NRF51 or NRF52)
        #[arg(long, value_parser = parse_family)]
        family: DeviceFamily,
    },

    /// Reset the device and let it run
    Reset {
        #[command(flatten)]
        reset: ResetArgs,
    },

    /// Start the CPU
    Run {
        /// Initial program counter
        #[arg(long, value_parser = parse_hex_u32)]
        pc: Option<u32>,

        /// Initial stack pointer
        #[arg(long, value_parser = parse_hex_u32)]
        sp: Option<u32>,
    },

    /// Compare the device against a hex file
    Verify {
        /// Intel hex file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print tool and probe versions
    Version,

    /// List supported probes
    ListProbes,

    /// List supported devices
    ListDevices,
}
