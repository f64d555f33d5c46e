//! Scratch pages owned by the caller.
//!
//! Used by the `selftest` command and the native test-suite to get memory
//! with known protections and known holes.

use std::io;

use super::Address;
use crate::protection::Protection;

/// A run of freshly mapped, zeroed, read-write pages.
///
/// Individual pages can be re-protected or released; everything still
/// mapped is released on drop.
#[derive(Debug)]
pub struct ScratchPages {
    base: Address,
    page_size: usize,
    mapped: Vec<bool>,
}

impl ScratchPages {
    /// Map `pages` contiguous read-write pages.
    pub fn map(pages: usize) -> io::Result<Self> {
        if pages == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "scratch mapping needs at least one page",
            ));
        }
        let page_size = sys::page_size();
        let base = sys::map(pages * page_size)?;
        Ok(Self {
            base,
            page_size,
            mapped: vec![true; pages],
        })
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn len(&self) -> usize {
        self.mapped.len() * self.page_size
    }

    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }

    /// Start address of page `index`.
    ///
    /// Fails with `InvalidInput` if `index` is past the end of the mapping.
    /// Released pages still have an address.
    pub fn page(&self, index: usize) -> io::Result<Address> {
        if index >= self.mapped.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {} out of range ({} pages)", index, self.mapped.len()),
            ));
        }
        Ok(self.start(index))
    }

    fn start(&self, index: usize) -> Address {
        self.base + index * self.page_size
    }

    /// Change the protection of `count` pages starting at page `index`.
    pub fn protect(&self, index: usize, count: usize, protection: Protection) -> io::Result<()> {
        self.check_mapped(index, count)?;
        // SAFETY: the pages belong to this mapping and nothing else refers
        // to them.
        unsafe { sys::protect(self.start(index), count * self.page_size, protection) }
    }

    /// Give page `index` back to the system, leaving a hole that is no longer
    /// committed.
    pub fn release(&mut self, index: usize) -> io::Result<()> {
        self.check_mapped(index, 1)?;
        // SAFETY: as for `protect`.
        unsafe { sys::release(self.start(index), self.page_size)? };
        self.mapped[index] = false;
        Ok(())
    }

    fn check_mapped(&self, index: usize, count: usize) -> io::Result<()> {
        let pages = self.mapped.get(index..index.saturating_add(count));
        match pages {
            Some(pages) if pages.iter().all(|mapped| *mapped) => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pages {}..{} are not mapped", index, index.saturating_add(count)),
            )),
        }
    }
}

impl Drop for ScratchPages {
    fn drop(&mut self) {
        sys::unmap(self.base, self.page_size, &self.mapped);
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::io;
    use std::ptr;

    use super::Address;
    use crate::backend::linux::{page_size as native_page_size, to_prot};
    use crate::protection::Protection;

    pub(super) fn page_size() -> usize {
        native_page_size()
    }

    pub(super) fn map(len: usize) -> io::Result<Address> {
        // SAFETY: anonymous private mapping at a kernel-chosen address.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(ptr as Address)
    }

    pub(super) unsafe fn protect(
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<()> {
        let failed =
            unsafe { libc::mprotect(address as *mut libc::c_void, len, to_prot(protection)) } != 0;
        if failed {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) unsafe fn release(address: Address, len: usize) -> io::Result<()> {
        if unsafe { libc::munmap(address as *mut libc::c_void, len) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    // Pages released earlier may have been reused by other mappings, so only
    // the pages still owned are unmapped.
    pub(super) fn unmap(base: Address, page_size: usize, mapped: &[bool]) {
        for (index, _) in mapped.iter().enumerate().filter(|(_, mapped)| **mapped) {
            // SAFETY: the page is still part of this mapping.
            unsafe { libc::munmap((base + index * page_size) as *mut libc::c_void, page_size) };
        }
    }
}

#[cfg(target_os = "windows")]
mod sys {
    use std::ffi::c_void;
    use std::io;

    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_PROTECTION_FLAGS,
        PAGE_READWRITE, VirtualAlloc, VirtualFree, VirtualProtect,
    };

    use super::Address;
    use crate::backend::win32::{page_size as native_page_size, to_flags};
    use crate::protection::Protection;

    pub(super) fn page_size() -> usize {
        native_page_size()
    }

    pub(super) fn map(len: usize) -> io::Result<Address> {
        // SAFETY: fresh allocation at a system-chosen address.
        let ptr = unsafe { VirtualAlloc(None, len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        if ptr.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(ptr as Address)
    }

    pub(super) unsafe fn protect(
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<()> {
        let mut previous = PAGE_PROTECTION_FLAGS(0);
        unsafe { VirtualProtect(address as *const c_void, len, to_flags(protection), &mut previous) }
            .map_err(io::Error::other)
    }

    // Decommit keeps the reservation, so the hole cannot be reused by an
    // unrelated allocation.
    pub(super) unsafe fn release(address: Address, len: usize) -> io::Result<()> {
        unsafe { VirtualFree(address as *mut c_void, len, MEM_DECOMMIT) }.map_err(io::Error::other)
    }

    pub(super) fn unmap(base: Address, _page_size: usize, _mapped: &[bool]) {
        // SAFETY: `base` is the start of our own reservation.
        let _ = unsafe { VirtualFree(base as *mut c_void, 0, MEM_RELEASE) };
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, NativeMemory};
    use crate::protection::RegionState;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_map_is_zeroed_and_writable() {
        let pages = ScratchPages::map(2).unwrap();
        let memory = NativeMemory::new();
        let mut buf = vec![0xFFu8; pages.len()];
        assert_eq!(memory.read(pages.base(), &mut buf).unwrap(), pages.len());
        assert!(buf.iter().all(|b| *b == 0));

        let region = memory.query(pages.page(1).unwrap()).unwrap();
        assert_eq!(region.protection, Protection::ReadWrite);
    }

    #[test]
    #[serial]
    fn test_protect_and_release() {
        let mut pages = ScratchPages::map(3).unwrap();
        let memory = NativeMemory::new();

        pages.protect(0, 1, Protection::ReadOnly).unwrap();
        assert_eq!(
            memory.query(pages.page(0).unwrap()).unwrap().protection,
            Protection::ReadOnly
        );

        pages.release(1).unwrap();
        assert_ne!(
            memory.query(pages.page(1).unwrap()).unwrap().state,
            RegionState::Committed
        );
        assert!(pages.protect(1, 1, Protection::ReadWrite).is_err());
        assert!(pages.release(1).is_err());
    }

    #[test]
    fn test_map_zero_pages_rejected() {
        assert!(ScratchPages::map(0).is_err());
    }

    #[test]
    #[serial]
    fn test_page_out_of_range() {
        let mut pages = ScratchPages::map(3).unwrap();
        assert_eq!(pages.page(2).unwrap(), pages.base() + 2 * pages.page_size());

        let err = pages.page(3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(pages.page(usize::MAX).is_err());

        pages.release(2).unwrap();
        assert_eq!(pages.page(2).unwrap(), pages.base() + 2 * pages.page_size());
    }
}
