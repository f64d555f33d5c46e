//! `pagesafe.toml` loading.
//!
//! ```toml
//! log_filter = "pagesafe=debug"
//!
//! [memory]
//! elevate_reads = true
//! elevate_writes = true
//! elevated_protection = "execute_read_write"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pagesafe_core::SafeMemoryConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// `tracing` filter directives used when `RUST_LOG` is not set
    pub log_filter: Option<String>,
    pub memory: SafeMemoryConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.memory.validate()?;
        Ok(config)
    }
}
