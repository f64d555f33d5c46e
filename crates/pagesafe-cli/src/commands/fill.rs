//! Fill command implementation.

use anyhow::Result;
use pagesafe_core::{NativeMemory, SafeMemory};

use super::hex_utils::{format_hex_address, resolve_address};

/// Run the fill command
pub fn run(memory: &SafeMemory<NativeMemory>, address: &str, value: u8, len: usize) -> Result<()> {
    let address = resolve_address(address)?;

    // SAFETY: the user explicitly asked to modify this process's memory.
    unsafe { memory.fill(address, value, len) }?;

    println!(
        "Filled {} byte(s) at {} with 0x{:02X}",
        len,
        format_hex_address(address),
        value
    );
    Ok(())
}
