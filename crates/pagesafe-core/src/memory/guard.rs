use std::io;

use tracing::{debug, warn};

use crate::backend::{Address, MemoryBackend};
use crate::protection::Protection;

/// Temporarily elevated protection of a range.
///
/// Holds the protection the range had before elevation. [`release`] puts it
/// back and hands the outcome to the caller; a guard dropped without being
/// released restores on drop and logs any failure.
///
/// [`release`]: ProtectionGuard::release
#[derive(Debug)]
#[must_use = "dropping the guard restores the previous protection immediately"]
pub struct ProtectionGuard<'a, B: MemoryBackend + ?Sized> {
    backend: &'a B,
    address: Address,
    len: usize,
    previous: Protection,
    elevated: Protection,
    released: bool,
}

impl<'a, B: MemoryBackend + ?Sized> ProtectionGuard<'a, B> {
    /// Switch `[address, address + len)` to `protection`.
    ///
    /// # Safety
    ///
    /// See [`MemoryBackend::protect`]. The guard must be released or dropped
    /// before other code relies on the original protection.
    pub unsafe fn elevate(
        backend: &'a B,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<Self> {
        let previous = unsafe { backend.protect(address, len, protection)? };
        debug!(
            "Elevated 0x{:X} ({} bytes): {} -> {}",
            address, len, previous, protection
        );
        Ok(Self {
            backend,
            address,
            len,
            previous,
            elevated: protection,
            released: false,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Protection the range had before elevation
    pub fn previous(&self) -> Protection {
        self.previous
    }

    /// Protection applied while elevated
    pub fn elevated(&self) -> Protection {
        self.elevated
    }

    /// Restore the previous protection.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        self.restore()
    }

    fn restore(&self) -> io::Result<()> {
        // SAFETY: puts back the protection observed when the guard was made.
        unsafe { self.backend.protect(self.address, self.len, self.previous) }?;
        debug!(
            "Restored 0x{:X} ({} bytes) to {}",
            self.address, self.len, self.previous
        );
        Ok(())
    }
}

impl<B: MemoryBackend + ?Sized> Drop for ProtectionGuard<'_, B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.restore() {
            warn!(
                "Could not restore {} protection at 0x{:X} ({} bytes): {}",
                self.previous, self.address, self.len, e
            );
        }
    }
}
