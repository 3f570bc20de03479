//! Erase command implementation

use super::{with_session, CmdResult, Context};
use nrfprog_core::memory::EraseMode;

/// Pick the erase mode from the command-line flags
///
/// The flags are mutually exclusive (enforced by clap); none means all.
pub fn erase_mode(eraseall: bool, erasepage: Option<u32>, eraseuicr: bool) -> EraseMode {
    match (eraseall, erasepage, eraseuicr) {
        (_, Some(addr), _) => EraseMode::Page(addr),
        (false, None, true) => EraseMode::Uicr,
        _ => EraseMode::All,
    }
}

/// Run the erase command
pub fn cmd_erase(ctx: &Context, mode: EraseMode) -> CmdResult {
    match mode {
        EraseMode::All => log::info!("Erasing code flash and UICR"),
        EraseMode::Page(addr) => log::info!("Erasing page at 0x{:08X}", addr),
        EraseMode::Uicr => log::info!("Erasing UICR"),
    }

    with_session(ctx, |session| {
        session.memory()?.erase(mode)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_mode() {
        assert_eq!(erase_mode(false, None, false), EraseMode::All);
        assert_eq!(erase_mode(true, None, false), EraseMode::All);
        assert_eq!(erase_mode(false, Some(0x1000), false), EraseMode::Page(0x1000));
        assert_eq!(erase_mode(false, None, true), EraseMode::Uicr);
    }
}
