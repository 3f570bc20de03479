//! nrfprog - Programmer for Nordic nRF51/nRF52 devices
//!
//! Flashes, erases, verifies, resets and inspects nRF5x devices over a debug
//! probe.
//!
//! # Architecture
//!
//! The binary is a thin layer over `nrfprog-core`:
//! - **Probe backends** (`openocd`, `dummy`) implement the core's
//!   `ProbeDriver` and are selected at runtime with `--probe`
//! - **The device session** auto-detects the device family and owns the
//!   one open probe for the duration of a command
//! - **The memory engine** sequences erase, write and verify against the
//!   device's memory map
//!
//! Every command opens its own session and closes it before returning.

mod cli;
mod commands;
mod hex;
mod probes;
mod progress;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Context;
use nrfprog_core::device::DeviceDatabase;
use nrfprog_core::memory::{BlankCheck, DumpSelection, ProgramOptions};
use nrfprog_core::reset::ResetKind;
use nrfprog_core::session::ConnectParams;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still overrides the verbosity flags
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match load_device_database(cli.device_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load device database: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Loaded {} device definitions", db.len());

    let ctx = Context {
        probe: cli.probe,
        db,
        params: ConnectParams {
            serial: cli.snr,
            clock_khz: cli.clockspeed,
        },
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Erase {
            eraseall,
            erasepage,
            eraseuicr,
        } => commands::cmd_erase(&ctx, commands::erase_mode(eraseall, erasepage, eraseuicr)),
        Commands::Halt => commands::cmd_halt(&ctx),
        Commands::Ids => commands::cmd_ids(&ctx),
        Commands::Memrd { addr, length } => commands::cmd_memrd(&ctx, addr, length),
        Commands::Memwr { addr, val } => commands::cmd_memwr(&ctx, addr, val),
        Commands::Pinresetenable => commands::cmd_pinresetenable(&ctx),
        Commands::Program {
            file,
            eraseall,
            sectorserase,
            sectorsanduicrerase,
            verify,
            no_blank_check,
            reset,
        } => {
            let options = ProgramOptions {
                erase: commands::erase_strategy(eraseall, sectorserase, sectorsanduicrerase),
                verify,
                blank_check: if no_blank_check {
                    BlankCheck::Skip
                } else {
                    BlankCheck::Required
                },
            };
            let reset = ResetKind::from_flags(reset.debugreset, reset.pinreset, reset.systemreset)?;
            commands::cmd_program(
                &ctx,
                commands::ProgramArgs {
                    file: &file,
                    options,
                    reset,
                },
            )
        }
        Commands::Rbp { rbplevel } => commands::cmd_rbp(&ctx, rbplevel),
        Commands::Readregs => commands::cmd_readregs(&ctx),
        Commands::Readtofile {
            file,
            readcode,
            readuicr,
            readram,
        } => {
            let mut selection = DumpSelection::empty();
            selection.set(DumpSelection::CODE, readcode);
            selection.set(DumpSelection::UICR, readuicr);
            selection.set(DumpSelection::RAM, readram);
            commands::cmd_readtofile(&ctx, &file, selection)
        }
        Commands::Recover { family } => commands::cmd_recover(&ctx, family),
        Commands::Reset { reset } => {
            let kind = ResetKind::from_flags(reset.debugreset, reset.pinreset, reset.systemreset)?;
            commands::cmd_reset(&ctx, kind)
        }
        Commands::Run { pc, sp } => commands::cmd_run(&ctx, pc, sp),
        Commands::Verify { file } => commands::cmd_verify(&ctx, &file),
        Commands::Version => commands::cmd_version(&ctx),
        Commands::ListProbes => {
            commands::cmd_list_probes();
            Ok(())
        }
        Commands::ListDevices => {
            commands::cmd_list_devices(&ctx.db);
            Ok(())
        }
    }
}

/// Built-in device table, extended from a RON file if one was given
fn load_device_database(path: Option<&Path>) -> Result<DeviceDatabase, Box<dyn std::error::Error>> {
    let mut db = DeviceDatabase::builtin();

    if let Some(path) = path {
        if !path.is_file() {
            return Err(format!("Device database not found: {}", path.display()).into());
        }
        let count = db.load_file(path)?;
        log::info!("Loaded {} extra device(s) from {}", count, path.display());
    }

    Ok(db)
}
