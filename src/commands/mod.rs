//! CLI command implementations
//!
//! Every device command follows the same shape: log what is about to happen,
//! open a session through the selected probe backend, run, disconnect. The
//! session's `Drop` releases the probe on error paths.
//!
//! ## Session commands
//!
//! Commands that need an identified device go through [`with_session`],
//! which runs family auto-detection. `recover` is the exception: a
//! protected device cannot be identified, so it adopts a probe opened for
//! an explicit family.
//!
//! ## Host commands
//!
//! `ids`, `version`, `list-probes` and `list-devices` never identify a
//! device.

mod control;
mod erase;
mod info;
mod program;
mod protect;
mod read;
mod write;

pub use control::{cmd_halt, cmd_pinresetenable, cmd_readregs, cmd_reset, cmd_run};
pub use erase::{cmd_erase, erase_mode};
pub use info::{cmd_ids, cmd_list_devices, cmd_list_probes, cmd_version};
pub use program::{cmd_program, cmd_verify, erase_strategy, ProgramArgs};
pub use protect::{cmd_rbp, cmd_recover};
pub use read::{cmd_memrd, cmd_readtofile};
pub use write::cmd_memwr;

use crate::probes::{self, Backend, DynProbe};
use crate::progress::IndicatifProgress;
use nrfprog_core::device::DeviceDatabase;
use nrfprog_core::session::{ConnectParams, DeviceSession};

/// Result type shared by all commands
pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Settings every command runs with
pub struct Context {
    /// Probe string (`name:key=value,...`)
    pub probe: String,
    /// Known device variants
    pub db: DeviceDatabase,
    /// Emulator selection
    pub params: ConnectParams,
    /// Suppress progress output
    pub quiet: bool,
}

impl Context {
    /// Build the backend factory for the selected probe
    pub fn backend(&self) -> CmdResult<Backend> {
        probes::open_backend(&self.probe, &self.db)
    }

    /// Progress reporter honoring `--quiet`
    pub fn progress(&self) -> IndicatifProgress {
        IndicatifProgress::new(self.quiet)
    }
}

/// Connect, identify the device, run `f`, then disconnect
pub fn with_session<T, F>(ctx: &Context, f: F) -> CmdResult<T>
where
    F: FnOnce(&mut DeviceSession<DynProbe>) -> CmdResult<T>,
{
    let mut backend = ctx.backend()?;
    let mut session = DeviceSession::connect(ctx.params, &mut backend, &ctx.db)?;
    let value = f(&mut session)?;
    session.disconnect()?;
    Ok(value)
}
