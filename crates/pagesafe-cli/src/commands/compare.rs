//! Compare command implementation.

use anyhow::{Result, bail};
use pagesafe_core::{NativeMemory, SafeMemory, hex};

use super::hex_utils::{format_hex_address, resolve_address};

/// Run the compare command
pub fn run(memory: &SafeMemory<NativeMemory>, address: &str, bytes: &str) -> Result<()> {
    let address = resolve_address(address)?;
    let expected = hex::decode(bytes)?;

    if !memory.compare(address, &expected) {
        bail!(
            "{} bytes at {} differ",
            expected.len(),
            format_hex_address(address)
        );
    }
    println!(
        "{} byte(s) at {} match",
        expected.len(),
        format_hex_address(address)
    );
    Ok(())
}
