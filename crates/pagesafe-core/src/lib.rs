//! # pagesafe-core
//!
//! Protection-aware memory transfers inside the calling process.
//!
//! This crate provides:
//! - A [`MemoryBackend`] abstraction over the OS virtual-memory interfaces,
//!   with native backends for Linux and Windows
//! - [`SafeMemory`], which reads, writes, fills and compares arbitrary byte
//!   ranges without faulting on unmapped or protected pages, temporarily
//!   elevating page protection where needed
//! - Hex decoding, module base lookup and textual address expressions for
//!   tools built on top of it
//!
//! ```no_run
//! use pagesafe_core::SafeMemory;
//!
//! let memory = SafeMemory::new();
//! let mut buf = [0u8; 16];
//! if memory.read(0x7f00_0000_0000, &mut buf).is_err() {
//!     // unreadable bytes are zero
//! }
//! ```

pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod hex;
pub mod memory;
pub mod module;
pub mod protection;

pub use address::AddressExpr;
pub use backend::{Address, MemoryBackend};
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub use backend::{NativeMemory, ScratchPages};
pub use config::{SafeMemoryConfig, SafeMemoryConfigBuilder};
pub use error::{Error, Result};
pub use memory::{ProtectionGuard, STAGING_CAPACITY, SafeMemory};
pub use protection::{Protection, ProtectionMask, Region, RegionState};
