//! Readback protection commands: rbp and recover

use super::{with_session, CmdResult, Context};
use nrfprog_core::device::DeviceFamily;
use nrfprog_core::probe::ProtectionLevel;
use nrfprog_core::session::{open_probe, DeviceSession};

/// What the user gives up by enabling readback protection
fn protection_warning(level: ProtectionLevel) -> &'static str {
    match level {
        ProtectionLevel::Region0 => {
            "Readback protection cannot be undone: region 0 stays unreadable \
             until the whole device is erased with `recover`"
        }
        ProtectionLevel::All => {
            "Readback protection cannot be undone: the debug port is locked \
             until the whole device is erased with `recover`"
        }
    }
}

/// Run the rbp command
pub fn cmd_rbp(ctx: &Context, level: ProtectionLevel) -> CmdResult {
    log::info!("Enabling readback protection ({:?})", level);
    log::warn!("{}", protection_warning(level));
    with_session(ctx, |session| {
        session.memory()?.readback_protect(level)?;
        Ok(())
    })
}

/// Run the recover command
///
/// A protected device cannot be identified, so the probe is opened for the
/// given family and adopted without auto-detection.
pub fn cmd_recover(ctx: &Context, family: DeviceFamily) -> CmdResult {
    log::info!("Recovering {} device", family);
    let mut backend = ctx.backend()?;
    let probe = open_probe(&mut backend, family)?;

    let mut session = DeviceSession::new(ctx.params);
    session.connect_external(probe)?;
    session.recover()?;
    session.disconnect()?;
    println!("Device recovered");
    Ok(())
}
