//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protection::Protection;

/// Configuration for [`SafeMemory`](crate::SafeMemory)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeMemoryConfig {
    /// Temporarily elevate pages that fail the read probe
    pub elevate_reads: bool,
    /// Temporarily elevate pages that fail the write probe
    pub elevate_writes: bool,
    /// Protection applied while a page is elevated
    pub elevated_protection: Protection,
}

impl Default for SafeMemoryConfig {
    fn default() -> Self {
        Self {
            elevate_reads: true,
            elevate_writes: true,
            elevated_protection: Protection::ExecuteReadWrite,
        }
    }
}

impl SafeMemoryConfig {
    /// Create a new configuration builder
    pub fn builder() -> SafeMemoryConfigBuilder {
        SafeMemoryConfigBuilder::default()
    }

    /// Reject configurations under which elevation cannot help.
    pub fn validate(&self) -> Result<()> {
        let elevating = self.elevate_reads || self.elevate_writes;
        let protection = self.elevated_protection;
        if elevating && !(protection.allows_read() && protection.allows_write()) {
            return Err(Error::InvalidConfig(format!(
                "elevated protection {} must allow reading and writing",
                protection
            )));
        }
        Ok(())
    }
}

/// Builder for SafeMemoryConfig
#[derive(Debug, Clone, Default)]
pub struct SafeMemoryConfigBuilder {
    elevate_reads: Option<bool>,
    elevate_writes: Option<bool>,
    elevated_protection: Option<Protection>,
}

impl SafeMemoryConfigBuilder {
    /// Enable or disable elevation on the read side
    pub fn elevate_reads(mut self, enabled: bool) -> Self {
        self.elevate_reads = Some(enabled);
        self
    }

    /// Enable or disable elevation on the write side
    pub fn elevate_writes(mut self, enabled: bool) -> Self {
        self.elevate_writes = Some(enabled);
        self
    }

    /// Set the protection used while elevated
    pub fn elevated_protection(mut self, protection: Protection) -> Self {
        self.elevated_protection = Some(protection);
        self
    }

    /// Build the configuration
    pub fn build(self) -> SafeMemoryConfig {
        let default = SafeMemoryConfig::default();
        SafeMemoryConfig {
            elevate_reads: self.elevate_reads.unwrap_or(default.elevate_reads),
            elevate_writes: self.elevate_writes.unwrap_or(default.elevate_writes),
            elevated_protection: self
                .elevated_protection
                .unwrap_or(default.elevated_protection),
        }
    }
}
