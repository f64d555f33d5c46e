mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pagesafe_core::SafeMemory;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::hex_utils::{parse_byte, parse_size};
use crate::config::CliConfig;

const DEFAULT_LOG_FILTER: &str = "pagesafe=info";

#[derive(Parser)]
#[command(name = "pagesafe")]
#[command(about = "Protection-aware memory access inside the current process")]
#[command(version)]
struct Args {
    #[arg(short, long, default_value = "pagesafe.toml", env = "PAGESAFE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether a range is readable and writable without elevation
    Probe {
        /// Address (0x7f001000, libc.so.6+0x1a0, libc.so.6)
        address: String,
        /// Length in bytes (decimal or 0x hex)
        #[arg(value_parser = parse_size, default_value = "1")]
        len: usize,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dump memory in hexdump format
    Hexdump {
        address: String,
        #[arg(value_parser = parse_size, default_value = "256")]
        len: usize,
        /// Show the ASCII column
        #[arg(long)]
        ascii: bool,
    },
    /// Write bytes, optionally only if the current content matches
    Patch {
        address: String,
        /// Bytes to write as hex ("90 90" or 0x9090)
        bytes: String,
        /// Required current content as hex
        #[arg(long)]
        expect: Option<String>,
    },
    /// Set a range to one byte value
    Fill {
        address: String,
        /// Byte value as hex (90, 0xCC)
        #[arg(value_parser = parse_byte)]
        value: u8,
        #[arg(value_parser = parse_size)]
        len: usize,
    },
    /// Compare memory against hex bytes
    Compare { address: String, bytes: String },
    /// Exercise every operation against scratch pages
    Selftest,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = CliConfig::load(&args.config);
    let log_filter = loaded
        .as_ref()
        .ok()
        .and_then(|c| c.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    // RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_filter))?,
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match loaded {
        Ok(c) => {
            info!("Loaded config from {:?}", args.config);
            c
        }
        Err(e) => {
            warn!("Failed to load config: {:#}, using defaults", e);
            CliConfig::default()
        }
    };

    let memory = SafeMemory::with_config(config.memory)?;

    match args.command {
        Command::Probe { address, len, json } => commands::probe::run(&memory, &address, len, json),
        Command::Hexdump {
            address,
            len,
            ascii,
        } => commands::hexdump::run(&memory, &address, len, ascii),
        Command::Patch {
            address,
            bytes,
            expect,
        } => commands::patch::run(&memory, &address, &bytes, expect.as_deref()),
        Command::Fill {
            address,
            value,
            len,
        } => commands::fill::run(&memory, &address, value, len),
        Command::Compare { address, bytes } => commands::compare::run(&memory, &address, &bytes),
        Command::Selftest => commands::selftest::run(config.memory),
    }
}
