use tracing::debug;

use super::{STAGING_CAPACITY, SafeMemory};
use crate::backend::{Address, MemoryBackend};
use crate::error::{Error, Result};

/// Map a failed sub-chunk count onto the public result.
pub(crate) fn complete(address: Address, len: usize, failed_chunks: usize) -> Result<()> {
    if failed_chunks == 0 {
        Ok(())
    } else {
        Err(Error::Incomplete {
            address,
            len,
            failed_chunks,
        })
    }
}

impl<B: MemoryBackend> SafeMemory<B> {
    /// Copy `len` bytes from `src` to `dest`, both addresses in this process.
    ///
    /// The source is staged through a bounded buffer, so neither range has to
    /// be accessible as a whole. If `expected` is given, `dest` must currently
    /// hold exactly those bytes or nothing is written.
    ///
    /// Every chunk is attempted even after a failure. Source bytes that could
    /// not be read are written as zeros.
    ///
    /// Overlapping ranges behave like `memmove`: when `dest` lies inside the
    /// source range, chunks are copied last to first so that no source byte
    /// is overwritten before it has been staged.
    ///
    /// # Safety
    ///
    /// `dest` may be live code or data of the process; see
    /// [`MemoryBackend::write`].
    pub unsafe fn copy(
        &self,
        dest: Address,
        src: Address,
        len: usize,
        expected: Option<&[u8]>,
    ) -> Result<()> {
        self.check_expected(dest, len, expected)?;

        let mut staging = [0u8; STAGING_CAPACITY];
        let mut failed = 0;
        let chunks = len.div_ceil(STAGING_CAPACITY);
        let backward = dest > src && dest - src < len;
        for step in 0..chunks {
            let index = if backward { chunks - 1 - step } else { step };
            let offset = index * STAGING_CAPACITY;
            let chunk = &mut staging[..(len - offset).min(STAGING_CAPACITY)];
            failed += self.page_read(src.wrapping_add(offset), chunk);
            // SAFETY: forwarded from the caller.
            failed += unsafe { self.page_write(dest.wrapping_add(offset), chunk) };
        }

        if failed > 0 {
            debug!(
                "Copy 0x{:X} -> 0x{:X} ({} bytes): {} chunk(s) failed",
                src, dest, len, failed
            );
        }
        complete(dest, len, failed)
    }

    /// Write `data` to `dest`, optionally guarded by `expected`.
    ///
    /// # Safety
    ///
    /// See [`SafeMemory::copy`].
    pub unsafe fn write(&self, dest: Address, data: &[u8], expected: Option<&[u8]>) -> Result<()> {
        self.check_expected(dest, data.len(), expected)?;
        // SAFETY: forwarded from the caller.
        let failed = unsafe { self.page_write(dest, data) };
        complete(dest, data.len(), failed)
    }

    /// Fill `buf` with the bytes at `src`.
    ///
    /// Bytes that could not be read are left zeroed and the call reports
    /// [`Error::Incomplete`].
    pub fn read(&self, src: Address, buf: &mut [u8]) -> Result<()> {
        let failed = self.page_read(src, buf);
        complete(src, buf.len(), failed)
    }

    fn check_expected(&self, dest: Address, len: usize, expected: Option<&[u8]>) -> Result<()> {
        let Some(expected) = expected else {
            return Ok(());
        };
        if expected.len() != len {
            return Err(Error::LengthMismatch {
                expected: len,
                actual: expected.len(),
            });
        }
        if !self.compare(dest, expected) {
            debug!(
                "0x{:X} ({} bytes) does not match expected content, not writing",
                dest, len
            );
            return Err(Error::UnexpectedContent { address: dest, len });
        }
        Ok(())
    }
}
