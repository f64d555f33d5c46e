//! Argument parsing and formatting helpers shared by the commands.

use anyhow::{Context, Result};
use pagesafe_core::{Address, AddressExpr};

/// Resolve an address argument (`0x1000`, `libc.so.6+0x1a0`, `libc.so.6`).
pub fn resolve_address(s: &str) -> Result<Address> {
    let expr: AddressExpr = s.parse()?;
    expr.resolve()
        .with_context(|| format!("Failed to resolve address {}", expr))
}

/// Parse a size given in decimal or, with a 0x prefix, in hex.
pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| anyhow::anyhow!("Invalid size {:?}: {}", s, e))
}

/// Parse a single byte given in hex, with or without 0x prefix.
pub fn parse_byte(s: &str) -> Result<u8> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| anyhow::anyhow!("Invalid hex byte: {}", e))
}

/// Format an address as a hex string with 0x prefix.
pub fn format_hex_address(addr: Address) -> String {
    format!("0x{:X}", addr)
}
