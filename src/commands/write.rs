//! Memwr command implementation

use super::{with_session, CmdResult, Context};

/// Run the memwr command
///
/// The engine picks the flash or RAM path from the address.
pub fn cmd_memwr(ctx: &Context, addr: u32, value: u32) -> CmdResult {
    log::info!("Writing 0x{:08X} to 0x{:08X}", value, addr);
    with_session(ctx, |session| {
        let region = session.memory()?.write_word(addr, value)?;
        log::debug!("Word written to {}", region);
        Ok(())
    })
}
