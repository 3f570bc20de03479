//! Reset variants and the run sequencer
//!
//! Every reset primitive leaves the core halted, so the sequencer always
//! follows a reset with `go()`.

use crate::error::{Result, UsageError};
use crate::probe::ProbeDriver;

/// Kind of reset to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Core reset through the debug interface
    Debug,
    /// Reset pin
    Pin,
    /// System reset request
    System,
}

impl ResetKind {
    /// Resolve mutually exclusive command-line flags
    ///
    /// Returns `None` when no flag is set.
    pub fn from_flags(debug: bool, pin: bool, system: bool) -> Result<Option<Self>> {
        match (debug, pin, system) {
            (false, false, false) => Ok(None),
            (true, false, false) => Ok(Some(ResetKind::Debug)),
            (false, true, false) => Ok(Some(ResetKind::Pin)),
            (false, false, true) => Ok(Some(ResetKind::System)),
            _ => Err(UsageError::ConflictingResetFlags.into()),
        }
    }
}

/// What to do when no reset kind was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Fall back to a system reset
    DefaultToSystem,
    /// Leave the device alone
    OnlyIfRequested,
}

/// Perform the requested reset, then let the core run
///
/// Returns the reset kind performed, if any.
pub fn reset<P: ProbeDriver + ?Sized>(
    probe: &mut P,
    requested: Option<ResetKind>,
    policy: ResetPolicy,
) -> Result<Option<ResetKind>> {
    let kind = match (requested, policy) {
        (Some(kind), _) => kind,
        (None, ResetPolicy::DefaultToSystem) => ResetKind::System,
        (None, ResetPolicy::OnlyIfRequested) => return Ok(None),
    };

    log::debug!("Applying {:?} reset", kind);
    match kind {
        ResetKind::Debug => probe.debug_reset()?,
        ResetKind::Pin => probe.pin_reset()?,
        ResetKind::System => probe.sys_reset()?,
    }
    probe.go()?;
    Ok(Some(kind))
}

/// Start the core
///
/// With both `pc` and `sp` the core starts at that entry point; with neither
/// it resumes where it is. Giving only one of them is a usage error and
/// nothing is sent to the probe.
pub fn run<P: ProbeDriver + ?Sized>(probe: &mut P, pc: Option<u32>, sp: Option<u32>) -> Result<()> {
    match (pc, sp) {
        (Some(pc), Some(sp)) => {
            log::debug!("Running from PC 0x{:08X}, SP 0x{:08X}", pc, sp);
            probe.run(pc, sp)
        }
        (None, None) => probe.go(),
        _ => Err(UsageError::PcSpMismatch.into()),
    }
}
