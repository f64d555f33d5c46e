//! Single-page transfers.
//!
//! Each transfer is split at page boundaries of the target address so that a
//! protection change never outlives the one page it was made for.

use tracing::{trace, warn};

use super::SafeMemory;
use super::guard::ProtectionGuard;
use super::probe::probe;
use crate::backend::{Address, MemoryBackend};
use crate::protection::ProtectionMask;

/// Length of the next sub-chunk: `remaining` clipped to the end of the page
/// containing `address`.
pub(crate) fn clip_to_page(address: Address, remaining: usize, page_size: usize) -> usize {
    let page_remain = page_size - address % page_size;
    remaining.min(page_remain)
}

impl<B: MemoryBackend> SafeMemory<B> {
    /// Read `dest.len()` bytes starting at `src`.
    ///
    /// Bytes that could not be read are zeroed. Returns the number of page
    /// sub-chunks that failed, so zero means complete success.
    pub(crate) fn page_read(&self, src: Address, dest: &mut [u8]) -> usize {
        let page_size = self.backend.page_size();
        let mut failed = 0;
        let mut done = 0;

        while done < dest.len() {
            let address = src.wrapping_add(done);
            let this_len = clip_to_page(address, dest.len() - done, page_size);
            let chunk = &mut dest[done..done + this_len];
            let mut ok = true;

            let guard = if self.config.elevate_reads
                && !probe(&self.backend, address, this_len, ProtectionMask::READ_ANY)
            {
                match self.elevate(address, this_len) {
                    Some(guard) => Some(guard),
                    None => {
                        ok = false;
                        None
                    }
                }
            } else {
                None
            };

            let read = match self.backend.read(address, chunk) {
                Ok(read) => read.min(this_len),
                Err(e) => {
                    trace!("Read of 0x{:X} ({} bytes) failed: {}", address, this_len, e);
                    0
                }
            };

            if let Some(guard) = guard {
                self.release(guard);
            }

            if read != this_len {
                chunk[read..].fill(0);
                ok = false;
            }
            if !ok {
                failed += 1;
            }
            done += this_len;
        }

        failed
    }

    /// Write `src` to memory starting at `dest`.
    ///
    /// Returns the number of page sub-chunks that failed. Failed sub-chunks
    /// are not retried.
    ///
    /// # Safety
    ///
    /// See [`MemoryBackend::write`].
    pub(crate) unsafe fn page_write(&self, dest: Address, src: &[u8]) -> usize {
        let page_size = self.backend.page_size();
        let mut failed = 0;
        let mut done = 0;

        while done < src.len() {
            let address = dest.wrapping_add(done);
            let this_len = clip_to_page(address, src.len() - done, page_size);
            let chunk = &src[done..done + this_len];
            let mut ok = true;

            let guard = if self.config.elevate_writes
                && !probe(&self.backend, address, this_len, ProtectionMask::WRITE_ANY)
            {
                match self.elevate(address, this_len) {
                    Some(guard) => Some(guard),
                    None => {
                        ok = false;
                        None
                    }
                }
            } else {
                None
            };

            // SAFETY: forwarded from the caller.
            let written = match unsafe { self.backend.write(address, chunk) } {
                Ok(written) => written,
                Err(e) => {
                    trace!("Write of 0x{:X} ({} bytes) failed: {}", address, this_len, e);
                    0
                }
            };

            if let Some(guard) = guard {
                self.release(guard);
            }

            if written != this_len {
                ok = false;
            }
            if !ok {
                failed += 1;
            }
            done += this_len;
        }

        failed
    }

    fn elevate(&self, address: Address, len: usize) -> Option<ProtectionGuard<'_, B>> {
        // SAFETY: the guard is released before the current page chunk ends.
        let result = unsafe {
            ProtectionGuard::elevate(
                &self.backend,
                address,
                len,
                self.config.elevated_protection,
            )
        };
        match result {
            Ok(guard) => Some(guard),
            Err(e) => {
                trace!(
                    "Could not elevate 0x{:X} ({} bytes) to {}: {}",
                    address, len, self.config.elevated_protection, e
                );
                None
            }
        }
    }

    fn release(&self, guard: ProtectionGuard<'_, B>) {
        let (address, len, previous) = (guard.address(), guard.len(), guard.previous());
        if let Err(e) = guard.release() {
            self.restore_failures.set(self.restore_failures.get() + 1);
            warn!(
                "Could not restore {} protection at 0x{:X} ({} bytes): {}",
                previous, address, len, e
            );
        }
    }
}
