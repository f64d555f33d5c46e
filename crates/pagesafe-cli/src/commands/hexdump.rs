//! Hexdump command implementation.
//!
//! Displays memory of the current process in traditional hexdump format.
//! Unreadable bytes show as `00`.
//!
//! # Output Format
//!
//! ```text
//! 0x7FFD1C2A0: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
//! ```

use anyhow::Result;
use pagesafe_core::{Address, NativeMemory, SafeMemory};
use tracing::warn;

use super::hex_utils::{format_hex_address, resolve_address};

/// Run the hexdump command
pub fn run(memory: &SafeMemory<NativeMemory>, address: &str, len: usize, ascii: bool) -> Result<()> {
    let address = resolve_address(address)?;
    let mut bytes = vec![0u8; len];
    if let Err(e) = memory.read(address, &mut bytes) {
        warn!("{}; unreadable bytes are shown as 00", e);
    }

    println!("Hexdump at {} ({} bytes):", format_hex_address(address), len);
    println!();

    for (i, chunk) in bytes.chunks(16).enumerate() {
        println!("{}", format_line(address.wrapping_add(i * 16), chunk, ascii));
    }

    Ok(())
}

fn format_line(address: Address, chunk: &[u8], ascii: bool) -> String {
    let mut line = format!("0x{:08X}: ", address);

    for (j, byte) in chunk.iter().enumerate() {
        if j == 8 {
            line.push(' ');
        }
        line.push_str(&format!("{:02X} ", byte));
    }

    // Padding for incomplete lines
    for j in chunk.len()..16 {
        if j == 8 {
            line.push(' ');
        }
        line.push_str("   ");
    }

    if ascii {
        line.push_str(" |");
        for byte in chunk {
            if (0x20..0x7F).contains(byte) {
                line.push(*byte as char);
            } else {
                line.push('.');
            }
        }
        for _ in chunk.len()..16 {
            line.push(' ');
        }
        line.push('|');
    }

    line
}
