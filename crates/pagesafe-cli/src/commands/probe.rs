//! Probe command implementation.

use anyhow::Result;
use pagesafe_core::{Address, MemoryBackend, NativeMemory, Region, SafeMemory};
use serde::Serialize;

use super::hex_utils::{format_hex_address, resolve_address};

#[derive(Debug, Serialize)]
struct ProbeReport {
    address: Address,
    len: usize,
    readable: bool,
    writable: bool,
    region: Option<Region>,
}

/// Run the probe command
pub fn run(memory: &SafeMemory<NativeMemory>, address: &str, len: usize, json: bool) -> Result<()> {
    let address = resolve_address(address)?;
    let report = ProbeReport {
        address,
        len,
        readable: memory.is_readable(address, len),
        writable: memory.is_writable(address, len),
        region: memory.backend().query(address),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Probe at {} ({} bytes):", format_hex_address(address), len);
    match report.region {
        Some(region) => println!(
            "  Region:   {} - {} ({}, {} {})",
            format_hex_address(region.base),
            format_hex_address(region.end()),
            region.state,
            region.protection,
            region.protection.rwx()
        ),
        None => println!("  Region:   query failed"),
    }
    println!("  Readable: {}", report.readable);
    println!("  Writable: {}", report.writable);

    Ok(())
}
