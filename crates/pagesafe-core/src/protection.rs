//! Page protection model shared by every backend.
//!
//! Protections follow the Windows vocabulary (read-only, write-copy,
//! execute-read, ...) because it is the richest of the supported platforms.
//! POSIX `r`/`w`/`x` permissions map onto a subset of it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

use crate::backend::Address;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    FromRepr,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Protection {
    NoAccess = 0,
    ReadOnly = 1,
    ReadWrite = 2,
    WriteCopy = 3,
    Execute = 4,
    ExecuteRead = 5,
    ExecuteReadWrite = 6,
    ExecuteWriteCopy = 7,
}

impl Protection {
    /// Build a protection from POSIX-style permission bits.
    ///
    /// Write-only pages do not exist on the supported architectures, so a
    /// writable page is always reported as readable too.
    pub fn from_flags(read: bool, write: bool, execute: bool) -> Self {
        match (read, write, execute) {
            (_, true, false) => Self::ReadWrite,
            (_, true, true) => Self::ExecuteReadWrite,
            (true, false, false) => Self::ReadOnly,
            (true, false, true) => Self::ExecuteRead,
            (false, false, true) => Self::Execute,
            (false, false, false) => Self::NoAccess,
        }
    }

    pub fn allows_read(&self) -> bool {
        ProtectionMask::READ_ANY.contains(*self)
    }

    pub fn allows_write(&self) -> bool {
        ProtectionMask::WRITE_ANY.contains(*self)
    }

    pub fn allows_execute(&self) -> bool {
        matches!(
            self,
            Self::Execute | Self::ExecuteRead | Self::ExecuteReadWrite | Self::ExecuteWriteCopy
        )
    }

    /// Short `rwx` rendering, as printed in `/proc/<pid>/maps`.
    pub fn rwx(&self) -> &'static str {
        match self {
            Self::NoAccess => "---",
            Self::ReadOnly => "r--",
            Self::ReadWrite | Self::WriteCopy => "rw-",
            Self::Execute => "--x",
            Self::ExecuteRead => "r-x",
            Self::ExecuteReadWrite | Self::ExecuteWriteCopy => "rwx",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A set of acceptable protections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtectionMask(u8);

impl ProtectionMask {
    /// Every protection that permits reading, execute variants included.
    pub const READ_ANY: Self = Self::of(&[
        Protection::ReadOnly,
        Protection::ReadWrite,
        Protection::WriteCopy,
        Protection::ExecuteRead,
        Protection::ExecuteReadWrite,
        Protection::ExecuteWriteCopy,
    ]);

    /// Every protection that permits writing, execute variants included.
    pub const WRITE_ANY: Self = Self::of(&[
        Protection::ReadWrite,
        Protection::WriteCopy,
        Protection::ExecuteReadWrite,
        Protection::ExecuteWriteCopy,
    ]);

    pub const fn of(protections: &[Protection]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < protections.len() {
            bits |= protections[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn contains(self, protection: Protection) -> bool {
        self.0 & protection.bit() != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegionState {
    /// Backed by storage and accessible subject to its protection
    Committed,
    /// Address space reserved without backing storage
    Reserved,
    /// Not part of any allocation
    Free,
}

/// Result of a region query: the run of pages sharing one state and
/// protection that contains the queried address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub base: Address,
    pub size: usize,
    pub state: RegionState,
    pub protection: Protection,
}

impl Region {
    /// One past the last byte of the region (saturating at the top of the
    /// address space).
    pub fn end(&self) -> Address {
        self.base.saturating_add(self.size)
    }

    pub fn is_committed(&self) -> bool {
        self.state == RegionState::Committed
    }

    /// Whether `[address, address + len)` lies entirely inside this region.
    pub fn covers(&self, address: Address, len: usize) -> bool {
        if len > self.size || address < self.base {
            return false;
        }
        address - self.base <= self.size - len
    }
}
