//! Host-side commands: ids, version, list-probes, list-devices

use super::{CmdResult, Context};
use crate::probes;
use nrfprog_core::device::DeviceDatabase;
use nrfprog_core::session::{enumerate_probes, probe_version};

/// Run the ids command
pub fn cmd_ids(ctx: &Context) -> CmdResult {
    log::info!("Listing attached probes");
    let mut backend = ctx.backend()?;
    let serials = enumerate_probes(&mut backend)?;
    if serials.is_empty() {
        log::warn!("No probes found");
    }
    for snr in serials {
        println!("{}", snr);
    }
    Ok(())
}

/// Run the version command
pub fn cmd_version(ctx: &Context) -> CmdResult {
    println!("nrfprog version: {}", env!("CARGO_PKG_VERSION"));
    let mut backend = ctx.backend()?;
    let version = probe_version(&mut backend)?;
    println!("probe version:   {}", version);
    Ok(())
}

/// List all supported probe backends
pub fn cmd_list_probes() {
    println!("Supported probes:");
    println!();
    for p in probes::available_probes() {
        println!("  {:10} - {}", p.name, p.description);
        if !p.aliases.is_empty() {
            println!("  {:10}   aliases: {}", "", p.aliases.join(", "));
        }
    }
}

/// List all known device variants
pub fn cmd_list_devices(db: &DeviceDatabase) {
    println!("Supported devices:");
    println!();
    println!(
        "{:<24} {:<7} {:>10} {:>10} {:>10}",
        "Version", "Family", "Flash", "RAM", "Page"
    );
    println!("{}", "-".repeat(65));

    for e in db.entries() {
        println!(
            "{:<24} {:<7} {:>10} {:>10} {:>10}",
            e.version.as_str(),
            e.family.name(),
            format_size(e.flash_size),
            format_size(e.ram_size),
            format_size(e.page_size)
        );
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0x100000), "1 MiB");
        assert_eq!(format_size(0x6000), "24 KiB");
        assert_eq!(format_size(0x400), "1 KiB");
        assert_eq!(format_size(100), "100 B");
    }
}
