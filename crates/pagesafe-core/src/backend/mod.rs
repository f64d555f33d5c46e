//! Virtual-memory backends.
//!
//! A backend is the only place that talks to the operating system. The
//! transfer engine in [`crate::memory`] is written against [`MemoryBackend`]
//! so that it can run over the real process (`NativeMemory`) or over a
//! simulated address space in tests.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) mod maps;
#[cfg(test)]
pub mod mock;
#[cfg(any(target_os = "linux", target_os = "windows"))]
mod scratch;
#[cfg(target_os = "windows")]
mod win32;

use std::io;

use crate::protection::{Protection, Region};

#[cfg(target_os = "linux")]
pub use linux::NativeMemory;
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub use scratch::ScratchPages;
#[cfg(target_os = "windows")]
pub use win32::NativeMemory;

/// A byte address in the current process.
pub type Address = usize;

/// Operating-system view of the calling process's address space.
///
/// Implementations must never dereference the addresses they are handed:
/// every transfer goes through a kernel interface that reports faults as
/// errors or short counts.
pub trait MemoryBackend {
    /// Page granularity of protection changes. Constant for the process.
    fn page_size(&self) -> usize;

    /// Describe the region containing `address`, or `None` if the query
    /// itself failed.
    fn query(&self, address: Address) -> Option<Region>;

    /// Change the protection of the pages covering `[address, address + len)`
    /// and return the protection they had before.
    ///
    /// # Safety
    ///
    /// Changing protection affects every thread of the process. The caller
    /// must restore the returned protection before any other code relies on
    /// the original one.
    unsafe fn protect(
        &self,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<Protection>;

    /// Copy bytes starting at `address` into `buf`.
    ///
    /// Returns the number of bytes actually copied, which may be short when
    /// the range runs into inaccessible memory.
    fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>;

    /// Copy `data` to `address`.
    ///
    /// Returns the number of bytes actually written.
    ///
    /// # Safety
    ///
    /// The destination may be live memory of the process (code, statics,
    /// heap). The caller is responsible for the program still being valid
    /// after the bytes change.
    unsafe fn write(&self, address: Address, data: &[u8]) -> io::Result<usize>;
}

impl<B: MemoryBackend + ?Sized> MemoryBackend for &B {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn query(&self, address: Address) -> Option<Region> {
        (**self).query(address)
    }

    unsafe fn protect(
        &self,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<Protection> {
        unsafe { (**self).protect(address, len, protection) }
    }

    fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(address, buf)
    }

    unsafe fn write(&self, address: Address, data: &[u8]) -> io::Result<usize> {
        unsafe { (**self).write(address, data) }
    }
}
