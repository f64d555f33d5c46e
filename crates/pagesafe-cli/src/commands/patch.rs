//! Patch command implementation.

use anyhow::{Result, bail};
use pagesafe_core::{Error, NativeMemory, SafeMemory, hex};
use tracing::info;

use super::hex_utils::{format_hex_address, resolve_address};

/// Run the patch command
pub fn run(
    memory: &SafeMemory<NativeMemory>,
    address: &str,
    bytes: &str,
    expect: Option<&str>,
) -> Result<()> {
    let address = resolve_address(address)?;
    let data = hex::decode(bytes)?;
    let expected = expect.map(hex::decode).transpose()?;

    // SAFETY: the user explicitly asked to modify this process's memory.
    let result = unsafe { memory.write(address, &data, expected.as_deref()) };
    match result {
        Ok(()) => {
            info!("Patched {} bytes at {}", data.len(), format_hex_address(address));
            println!("Patched {} byte(s) at {}", data.len(), format_hex_address(address));
        }
        Err(e @ Error::UnexpectedContent { .. }) => {
            let mut current = vec![0u8; data.len()];
            let _ = memory.read(address, &mut current);
            bail!("{} (found: {})", e, hex::encode(&current));
        }
        Err(e) => return Err(e.into()),
    }

    if memory.restore_failures() > 0 {
        println!(
            "Warning: {} protection restore(s) failed",
            memory.restore_failures()
        );
    }
    Ok(())
}
