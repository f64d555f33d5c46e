use tracing::debug;

use super::copy::complete;
use super::{STAGING_CAPACITY, SafeMemory};
use crate::backend::{Address, MemoryBackend};
use crate::error::Result;

impl<B: MemoryBackend> SafeMemory<B> {
    /// Set `len` bytes at `dest` to `value`.
    ///
    /// Unlike [`SafeMemory::copy`], a fill stops at the first staging chunk
    /// that fails. The error then describes the range that was not (fully)
    /// filled, starting at that chunk.
    ///
    /// # Safety
    ///
    /// See [`SafeMemory::copy`].
    pub unsafe fn fill(&self, dest: Address, value: u8, len: usize) -> Result<()> {
        let staging = [value; STAGING_CAPACITY];
        let mut done = 0;
        while done < len {
            let this_len = (len - done).min(STAGING_CAPACITY);
            let address = dest.wrapping_add(done);
            // SAFETY: forwarded from the caller.
            let failed = unsafe { self.page_write(address, &staging[..this_len]) };
            if failed > 0 {
                debug!(
                    "Fill of 0x{:X} ({} bytes) stopped at 0x{:X}",
                    dest, len, address
                );
                return complete(address, len - done, failed);
            }
            done += this_len;
        }
        Ok(())
    }

    /// Whether the `expected.len()` bytes at `address` equal `expected`.
    ///
    /// Memory is staged chunk by chunk with the same elevation rules as
    /// [`SafeMemory::read`]. Any chunk that cannot be read in full makes the
    /// comparison false.
    pub fn compare(&self, address: Address, expected: &[u8]) -> bool {
        let mut staging = [0u8; STAGING_CAPACITY];
        for (i, want) in expected.chunks(STAGING_CAPACITY).enumerate() {
            let chunk = &mut staging[..want.len()];
            if self.page_read(address.wrapping_add(i * STAGING_CAPACITY), chunk) != 0 {
                return false;
            }
            if chunk != want {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Address;
    use crate::backend::mock::MockMemory;
    use crate::config::SafeMemoryConfig;
    use crate::error::Error;
    use crate::memory::SafeMemory;
    use crate::protection::Protection;

    const BASE: Address = 0x300000;
    const PAGE: usize = 0x1000;

    fn engine(memory: MockMemory) -> SafeMemory<MockMemory> {
        SafeMemory::with_backend(memory, SafeMemoryConfig::default()).unwrap()
    }

    #[test]
    fn test_fill_then_compare() {
        let engine = engine(
            MockMemory::builder()
                .map(BASE, 3, Protection::ReadWrite, 0)
                .build(),
        );
        let len = 2 * PAGE + 10;

        unsafe { engine.fill(BASE + 5, 0xCC, len) }.unwrap();

        assert!(engine.compare(BASE + 5, &vec![0xCC; len]));
        assert!(!engine.compare(BASE + 4, &vec![0xCC; len]));
        assert_eq!(engine.backend().mapped_bytes(BASE + 5 + len, 1), vec![0]);
    }

    #[test]
    fn test_fill_stops_at_first_failing_chunk() {
        let engine = engine(
            MockMemory::builder()
                .map(BASE, 2, Protection::ReadWrite, 0)
                .map(BASE + 3 * PAGE, 1, Protection::ReadWrite, 0)
                .build(),
        );

        let err = unsafe { engine.fill(BASE, 0xAB, 4 * PAGE) }.unwrap_err();
        assert!(matches!(
            err,
            Error::Incomplete {
                address,
                len,
                failed_chunks: 1
            } if address == BASE + 2 * PAGE && len == 2 * PAGE
        ));
        let memory = engine.backend();
        assert_eq!(memory.mapped_bytes(BASE, 2 * PAGE), vec![0xAB; 2 * PAGE]);
        assert_eq!(memory.mapped_bytes(BASE + 3 * PAGE, PAGE), vec![0; PAGE]);
    }

    #[test]
    fn test_fill_read_only_page_restores_protection() {
        let engine = engine(
            MockMemory::builder()
                .map(BASE, 1, Protection::ReadOnly, 0)
                .build(),
        );

        unsafe { engine.fill(BASE, 0x90, 16) }.unwrap();
        assert_eq!(engine.backend().mapped_bytes(BASE, 16), vec![0x90; 16]);
        assert_eq!(
            engine.backend().protection_at(BASE),
            Some(Protection::ReadOnly)
        );
    }

    #[test]
    fn test_compare_unreadable_range_is_false() {
        let engine = engine(
            MockMemory::builder()
                .map(BASE, 1, Protection::ReadWrite, 0)
                .build(),
        );

        assert!(!engine.compare(BASE + PAGE - 4, &[0; 8]));
        assert!(!engine.compare(0, &[0]));
    }

    #[test]
    fn test_compare_elevates_no_access_page() {
        let engine = engine(
            MockMemory::builder()
                .map(BASE, 1, Protection::NoAccess, 0x33)
                .build(),
        );

        assert!(engine.compare(BASE, &[0x33; 64]));
        assert_eq!(
            engine.backend().protection_at(BASE),
            Some(Protection::NoAccess)
        );
    }

    #[test]
    fn test_compare_without_read_elevation() {
        let config = SafeMemoryConfig::builder().elevate_reads(false).build();
        let engine = SafeMemory::with_backend(
            MockMemory::builder()
                .map(BASE, 1, Protection::NoAccess, 0)
                .build(),
            config,
        )
        .unwrap();

        assert!(!engine.compare(BASE, &[0; 4]));
    }

    #[test]
    fn test_empty_compare_is_true() {
        let engine = engine(MockMemory::builder().build());
        assert!(engine.compare(BASE, &[]));
    }
}
