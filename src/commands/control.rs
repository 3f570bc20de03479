//! Core control commands: halt, reset, run, readregs, pinresetenable

use super::{with_session, CmdResult, Context};
use nrfprog_core::reset::{self, ResetKind, ResetPolicy};

/// Run the halt command
pub fn cmd_halt(ctx: &Context) -> CmdResult {
    log::info!("Halting the CPU");
    with_session(ctx, |session| {
        session.memory()?.halt()?;
        Ok(())
    })
}

/// Run the reset command; a system reset is used if none was requested
pub fn cmd_reset(ctx: &Context, kind: Option<ResetKind>) -> CmdResult {
    log::info!("Resetting the device");
    with_session(ctx, |session| {
        let done = reset::reset(session.probe_mut()?, kind, ResetPolicy::DefaultToSystem)?;
        log::debug!("Applied {:?} reset", done);
        Ok(())
    })
}

/// Run the run command
pub fn cmd_run(ctx: &Context, pc: Option<u32>, sp: Option<u32>) -> CmdResult {
    log::info!("Starting the CPU");
    with_session(ctx, |session| {
        reset::run(session.probe_mut()?, pc, sp)?;
        Ok(())
    })
}

/// Run the readregs command
pub fn cmd_readregs(ctx: &Context) -> CmdResult {
    log::info!("Reading the CPU registers");
    with_session(ctx, |session| {
        for (reg, value) in session.memory()?.read_registers()? {
            println!("{:<5} 0x{:08X}", reg.name(), value);
        }
        Ok(())
    })
}

/// Run the pinresetenable command
pub fn cmd_pinresetenable(ctx: &Context) -> CmdResult {
    log::info!("Enabling the reset pin");
    with_session(ctx, |session| {
        session.memory()?.enable_pin_reset()?;
        Ok(())
    })
}
