//! Linux backend: `/proc/self/maps`, `mprotect` and `process_vm_readv`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::OnceLock;

use tracing::{debug, warn};

use super::maps;
use super::{Address, MemoryBackend};
use crate::protection::{Protection, Region};

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as usize } else { 4096 }
    })
}

pub(crate) fn to_prot(protection: Protection) -> libc::c_int {
    match protection {
        Protection::NoAccess => libc::PROT_NONE,
        Protection::ReadOnly => libc::PROT_READ,
        Protection::ReadWrite | Protection::WriteCopy => libc::PROT_READ | libc::PROT_WRITE,
        Protection::Execute => libc::PROT_EXEC,
        Protection::ExecuteRead => libc::PROT_READ | libc::PROT_EXEC,
        Protection::ExecuteReadWrite | Protection::ExecuteWriteCopy => {
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
        }
    }
}

/// Page-aligned span covering `[address, address + len)`.
pub(crate) fn page_span(address: Address, len: usize) -> io::Result<(Address, usize)> {
    let page = page_size();
    let start = address & !(page - 1);
    let end = address
        .checked_add(len.max(1))
        .and_then(|end| end.checked_add(page - 1))
        .map(|end| end & !(page - 1))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "range overflows"))?;
    Ok((start, end - start))
}

/// The calling process, seen through the kernel's virtual-memory interfaces.
///
/// Transfers use `process_vm_readv`/`process_vm_writev` on the own pid, which
/// honour page protections and fail with `EFAULT` instead of faulting. When
/// those syscalls are unavailable (old kernels, seccomp policies) transfers
/// fall back to `/proc/self/mem`.
///
/// Every [`query`] reads `/proc/self/maps` and nothing is cached, since any
/// `mmap` or `mprotect` in the process makes a cached answer stale. Every
/// [`protect`] queries once for the protection it replaces. Transferring a
/// page that needs no elevation reads the maps file once; elevating one
/// reads it three times (check, elevate, restore).
///
/// [`query`]: MemoryBackend::query
/// [`protect`]: MemoryBackend::protect
#[derive(Debug)]
pub struct NativeMemory {
    pid: libc::pid_t,
    proc_mem: OnceLock<Option<File>>,
}

impl NativeMemory {
    pub fn new() -> Self {
        Self {
            pid: std::process::id() as libc::pid_t,
            proc_mem: OnceLock::new(),
        }
    }

    fn proc_mem(&self) -> io::Result<&File> {
        self.proc_mem
            .get_or_init(|| {
                match OpenOptions::new().read(true).write(true).open("/proc/self/mem") {
                    Ok(file) => Some(file),
                    Err(e) => {
                        warn!("Failed to open /proc/self/mem: {}", e);
                        None
                    }
                }
            })
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "no memory transport"))
    }
}

impl Default for NativeMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_fallback(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOSYS) | Some(libc::EPERM))
}

impl MemoryBackend for NativeMemory {
    fn page_size(&self) -> usize {
        page_size()
    }

    fn query(&self, address: Address) -> Option<Region> {
        match maps::query_self(address) {
            Ok(region) => Some(region),
            Err(e) => {
                debug!("Region query at 0x{:X} failed: {}", address, e);
                None
            }
        }
    }

    unsafe fn protect(
        &self,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<Protection> {
        let previous = self
            .query(address)
            .filter(Region::is_committed)
            .map(|region| region.protection)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOMEM))?;

        let (start, span) = page_span(address, len)?;
        // SAFETY: mprotect only changes page attributes; the caller restores
        // the previous protection.
        let failed =
            unsafe { libc::mprotect(start as *mut libc::c_void, span, to_prot(protection)) } != 0;
        if failed {
            return Err(io::Error::last_os_error());
        }

        Ok(previous)
    }

    fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let local = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let remote = libc::iovec {
            iov_base: address as *mut libc::c_void,
            iov_len: buf.len(),
        };
        // SAFETY: the local iovec covers `buf`; the kernel validates the
        // remote one and reports faults as EFAULT.
        let read = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if read >= 0 {
            return Ok(read as usize);
        }

        let err = io::Error::last_os_error();
        if needs_fallback(&err) {
            return self.proc_mem()?.read_at(buf, address as u64);
        }
        Err(err)
    }

    unsafe fn write(&self, address: Address, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let local = libc::iovec {
            iov_base: data.as_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        };
        let remote = libc::iovec {
            iov_base: address as *mut libc::c_void,
            iov_len: data.len(),
        };
        // SAFETY: the kernel only reads from the local iovec; the remote one
        // is validated against the current protections.
        let written = unsafe { libc::process_vm_writev(self.pid, &local, 1, &remote, 1, 0) };
        if written >= 0 {
            return Ok(written as usize);
        }

        let err = io::Error::last_os_error();
        if needs_fallback(&err) {
            return self.proc_mem()?.write_at(data, address as u64);
        }
        Err(err)
    }
}
