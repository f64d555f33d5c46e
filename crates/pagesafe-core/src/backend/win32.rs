//! Windows backend: `VirtualQuery`, `VirtualProtect` and
//! `ReadProcessMemory`/`WriteProcessMemory` on the current process.

use std::ffi::c_void;
use std::io;
use std::mem;
use std::sync::OnceLock;

use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RESERVE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE, PAGE_EXECUTE_READ,
    PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_NOACCESS,
    PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY, VirtualProtect,
    VirtualQuery,
};
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows::Win32::System::Threading::GetCurrentProcess;

use super::{Address, MemoryBackend};
use crate::protection::{Protection, Region, RegionState};

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        let mut info = SYSTEM_INFO::default();
        // SAFETY: `info` is a valid out-pointer.
        unsafe { GetSystemInfo(&mut info) };
        info.dwPageSize as usize
    })
}

pub(crate) fn to_flags(protection: Protection) -> PAGE_PROTECTION_FLAGS {
    match protection {
        Protection::NoAccess => PAGE_NOACCESS,
        Protection::ReadOnly => PAGE_READONLY,
        Protection::ReadWrite => PAGE_READWRITE,
        Protection::WriteCopy => PAGE_WRITECOPY,
        Protection::Execute => PAGE_EXECUTE,
        Protection::ExecuteRead => PAGE_EXECUTE_READ,
        Protection::ExecuteReadWrite => PAGE_EXECUTE_READWRITE,
        Protection::ExecuteWriteCopy => PAGE_EXECUTE_WRITECOPY,
    }
}

/// Guard pages fault on first touch, so they count as inaccessible.
/// Caching modifiers are ignored.
pub(crate) fn from_flags(flags: PAGE_PROTECTION_FLAGS) -> Protection {
    if flags.0 & PAGE_GUARD.0 != 0 {
        return Protection::NoAccess;
    }
    match PAGE_PROTECTION_FLAGS(flags.0 & 0xFF) {
        PAGE_READONLY => Protection::ReadOnly,
        PAGE_READWRITE => Protection::ReadWrite,
        PAGE_WRITECOPY => Protection::WriteCopy,
        PAGE_EXECUTE => Protection::Execute,
        PAGE_EXECUTE_READ => Protection::ExecuteRead,
        PAGE_EXECUTE_READWRITE => Protection::ExecuteReadWrite,
        PAGE_EXECUTE_WRITECOPY => Protection::ExecuteWriteCopy,
        _ => Protection::NoAccess,
    }
}

/// The calling process, seen through the Win32 virtual-memory API.
#[derive(Debug, Default)]
pub struct NativeMemory;

impl NativeMemory {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryBackend for NativeMemory {
    fn page_size(&self) -> usize {
        page_size()
    }

    fn query(&self, address: Address) -> Option<Region> {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: `info` is a valid out-buffer of the size passed.
        let written = unsafe {
            VirtualQuery(
                Some(address as *const c_void),
                &mut info,
                mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return None;
        }

        let state = if info.State == MEM_COMMIT {
            RegionState::Committed
        } else if info.State == MEM_RESERVE {
            RegionState::Reserved
        } else {
            RegionState::Free
        };

        Some(Region {
            base: info.BaseAddress as Address,
            size: info.RegionSize,
            state,
            protection: from_flags(info.Protect),
        })
    }

    unsafe fn protect(
        &self,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<Protection> {
        let mut previous = PAGE_PROTECTION_FLAGS(0);
        // SAFETY: VirtualProtect validates the range; the caller restores the
        // returned protection.
        unsafe {
            VirtualProtect(
                address as *const c_void,
                len,
                to_flags(protection),
                &mut previous,
            )
        }
        .map_err(io::Error::other)?;
        Ok(from_flags(previous))
    }

    fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize> {
        let mut read = 0usize;
        // SAFETY: `buf` is a valid destination of `buf.len()` bytes; the
        // source is validated by the kernel.
        let result = unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read),
            )
        };
        match result {
            Ok(()) => Ok(read),
            // ERROR_PARTIAL_COPY still reports how far the copy got
            Err(_) if read > 0 => Ok(read),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    unsafe fn write(&self, address: Address, data: &[u8]) -> io::Result<usize> {
        let mut written = 0usize;
        // SAFETY: `data` is a valid source; the destination is validated by
        // the kernel against current protections.
        let result = unsafe {
            WriteProcessMemory(
                GetCurrentProcess(),
                address as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        };
        match result {
            Ok(()) => Ok(written),
            Err(_) if written > 0 => Ok(written),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}
