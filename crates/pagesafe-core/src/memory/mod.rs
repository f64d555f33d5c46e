//! Page-safe transfers over a [`MemoryBackend`].
//!
//! Layers, leaf first:
//! - `probe`: is a range accessible under a protection mask
//! - `transfer`: one OS transfer per page, elevating protection when needed
//! - `copy`: chunked copy through a bounded staging buffer, with an optional
//!   content guard
//! - `ops`: fill and compare built on the chunked copy

mod copy;
mod guard;
mod ops;
mod probe;
mod transfer;

use std::cell::Cell;

use crate::backend::{Address, MemoryBackend};
use crate::config::SafeMemoryConfig;
use crate::error::Result;
use crate::protection::ProtectionMask;

pub use guard::ProtectionGuard;

/// Capacity of the staging buffer used by copy, fill and compare.
pub const STAGING_CAPACITY: usize = 4096;

/// Protection-aware access to the calling process's memory.
///
/// Every operation either fully succeeds, reports precisely how it partially
/// failed, or refuses without side effects. None of them dereference the
/// target addresses, so unmapped or protected memory never crashes the
/// process.
///
/// Protection changes are process-wide and are not synchronised. The engine
/// is deliberately `!Sync`; callers that patch the same pages from several
/// threads must serialise those calls themselves.
#[derive(Debug)]
pub struct SafeMemory<B: MemoryBackend> {
    backend: B,
    config: SafeMemoryConfig,
    restore_failures: Cell<u64>,
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
impl SafeMemory<crate::backend::NativeMemory> {
    /// Engine over the current process with the default configuration
    pub fn new() -> Self {
        Self::from_parts(
            crate::backend::NativeMemory::new(),
            SafeMemoryConfig::default(),
        )
    }

    /// Engine over the current process with a custom configuration.
    ///
    /// Fails with [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration does not pass [`SafeMemoryConfig::validate`].
    pub fn with_config(config: SafeMemoryConfig) -> Result<Self> {
        Self::with_backend(crate::backend::NativeMemory::new(), config)
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
impl Default for SafeMemory<crate::backend::NativeMemory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: MemoryBackend> SafeMemory<B> {
    /// Engine over `backend`.
    ///
    /// The configuration is validated first: an elevated protection that
    /// does not allow both reading and writing would lower page protection
    /// instead of raising it.
    pub fn with_backend(backend: B, config: SafeMemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(backend, config))
    }

    fn from_parts(backend: B, config: SafeMemoryConfig) -> Self {
        Self {
            backend,
            config,
            restore_failures: Cell::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SafeMemoryConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.backend.page_size()
    }

    /// Number of elevations whose original protection could not be put back.
    ///
    /// Each one leaves a page more permissive than it was.
    pub fn restore_failures(&self) -> u64 {
        self.restore_failures.get()
    }

    /// Whether the whole range is currently readable without elevation.
    pub fn is_readable(&self, address: Address, len: usize) -> bool {
        probe::probe(&self.backend, address, len, ProtectionMask::READ_ANY)
    }

    /// Whether the whole range is currently writable without elevation.
    pub fn is_writable(&self, address: Address, len: usize) -> bool {
        probe::probe(&self.backend, address, len, ProtectionMask::WRITE_ANY)
    }
}
