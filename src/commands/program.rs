//! Program and verify command implementations

use std::path::Path;

use super::{with_session, CmdResult, Context};
use crate::hex;
use nrfprog_core::memory::{BlankCheck, EraseStrategy, ProgramOptions};
use nrfprog_core::reset::{self, ResetKind, ResetPolicy};

/// Pick the erase strategy from the command-line flags
pub fn erase_strategy(eraseall: bool, sectors: bool, sectors_and_uicr: bool) -> EraseStrategy {
    if eraseall {
        EraseStrategy::All
    } else if sectors_and_uicr {
        EraseStrategy::SectorsAndUicr
    } else if sectors {
        EraseStrategy::Sectors
    } else {
        EraseStrategy::None
    }
}

/// Options for the program command
pub struct ProgramArgs<'a> {
    /// Hex file to program
    pub file: &'a Path,
    /// Erase, verify and blank-check behavior
    pub options: ProgramOptions,
    /// Reset to apply afterwards, if any
    pub reset: Option<ResetKind>,
}

/// Run the program command
pub fn cmd_program(ctx: &Context, args: ProgramArgs<'_>) -> CmdResult {
    log::info!("Parsing hex file {}", args.file.display());
    let segments = hex::load_segments(args.file)?;

    if args.options.blank_check == BlankCheck::Skip && args.options.erase == EraseStrategy::None {
        log::warn!("Programming without erase or blank check");
    }

    with_session(ctx, |session| {
        log::info!("Programming device");
        let mut progress = ctx.progress();
        session
            .memory()?
            .program(&segments, &args.options, &mut progress)?;
        progress.finish();

        if args.options.verify {
            log::info!("Device programmed and verified");
        }

        let probe = session.probe_mut()?;
        if let Some(kind) = reset::reset(probe, args.reset, ResetPolicy::OnlyIfRequested)? {
            log::info!("Applied {:?} reset", kind);
        }
        Ok(())
    })
}

/// Run the verify command
pub fn cmd_verify(ctx: &Context, file: &Path) -> CmdResult {
    log::info!("Parsing hex file {}", file.display());
    let segments = hex::load_segments(file)?;

    with_session(ctx, |session| {
        log::info!("Verifying device against {}", file.display());
        let mut progress = ctx.progress();
        session.memory()?.verify(&segments, &mut progress)?;
        progress.finish();
        println!("Verified OK");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_strategy() {
        assert_eq!(erase_strategy(false, false, false), EraseStrategy::None);
        assert_eq!(erase_strategy(true, false, false), EraseStrategy::All);
        assert_eq!(erase_strategy(false, true, false), EraseStrategy::Sectors);
        assert_eq!(
            erase_strategy(false, false, true),
            EraseStrategy::SectorsAndUicr
        );
    }
}
