//! Simulated address space for testing the transfer engine.
//!
//! Pages are mapped explicitly with a protection. Reads and writes honour
//! those protections exactly like the kernel interfaces do: a transfer stops
//! at the first byte it may not touch and reports a short count.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::io;

use super::{Address, MemoryBackend};
use crate::protection::{Protection, Region, RegionState};

const DEFAULT_PAGE_SIZE: usize = 4096;

#[derive(Debug, Clone)]
struct MockPage {
    data: Vec<u8>,
    protection: Protection,
}

/// A record of one successful `protect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectCall {
    pub address: Address,
    pub len: usize,
    pub protection: Protection,
}

#[derive(Debug)]
pub struct MockMemory {
    page_size: usize,
    pages: RefCell<BTreeMap<Address, MockPage>>,
    locked: HashSet<Address>,
    refused: HashSet<Protection>,
    fail_queries: Cell<bool>,
    protect_calls: RefCell<Vec<ProtectCall>>,
}

impl MockMemory {
    pub fn builder() -> MockMemoryBuilder {
        MockMemoryBuilder::default()
    }

    /// Raw page contents, ignoring protection. Unmapped bytes are `None`.
    pub fn bytes(&self, address: Address, len: usize) -> Vec<Option<u8>> {
        let pages = self.pages.borrow();
        (address..address + len)
            .map(|a| {
                pages
                    .get(&self.page_base(a))
                    .map(|page| page.data[a % self.page_size])
            })
            .collect()
    }

    /// Raw contents of a fully mapped range.
    pub fn mapped_bytes(&self, address: Address, len: usize) -> Vec<u8> {
        self.bytes(address, len)
            .into_iter()
            .map(|b| b.expect("range is mapped"))
            .collect()
    }

    pub fn protection_at(&self, address: Address) -> Option<Protection> {
        self.pages
            .borrow()
            .get(&self.page_base(address))
            .map(|page| page.protection)
    }

    pub fn protect_calls(&self) -> Vec<ProtectCall> {
        self.protect_calls.borrow().clone()
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.set(fail);
    }

    fn page_base(&self, address: Address) -> Address {
        address - address % self.page_size
    }

    fn transfer(
        &self,
        address: Address,
        len: usize,
        allowed: impl Fn(Protection) -> bool,
        mut each: impl FnMut(&mut MockPage, usize, usize),
    ) -> io::Result<usize> {
        let mut pages = self.pages.borrow_mut();
        let mut done = 0;
        while done < len {
            let current = address + done;
            let Some(page) = pages.get_mut(&self.page_base(current)) else {
                break;
            };
            if !allowed(page.protection) {
                break;
            }
            let offset = current % self.page_size;
            let this_len = (len - done).min(self.page_size - offset);
            each(page, offset, done);
            done += this_len;
        }
        if done == 0 && len > 0 {
            return Err(io::Error::other("bad address"));
        }
        Ok(done)
    }
}

impl MemoryBackend for MockMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn query(&self, address: Address) -> Option<Region> {
        if self.fail_queries.get() {
            return None;
        }
        let pages = self.pages.borrow();
        let base = self.page_base(address);
        let Some(first) = pages.get(&base) else {
            return Some(Region {
                base,
                size: self.page_size,
                state: RegionState::Free,
                protection: Protection::NoAccess,
            });
        };

        let mut size = self.page_size;
        while let Some(next) = pages.get(&(base + size)) {
            if next.protection != first.protection {
                break;
            }
            size += self.page_size;
        }

        Some(Region {
            base,
            size,
            state: RegionState::Committed,
            protection: first.protection,
        })
    }

    unsafe fn protect(
        &self,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> io::Result<Protection> {
        if self.refused.contains(&protection) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} refused", protection),
            ));
        }

        let first = self.page_base(address);
        let last = self.page_base(address + len.max(1) - 1);
        let mut pages = self.pages.borrow_mut();
        let mut base = first;
        while base <= last {
            if !pages.contains_key(&base) || self.locked.contains(&base) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("page 0x{:X} cannot be re-protected", base),
                ));
            }
            base += self.page_size;
        }

        let previous = pages[&first].protection;
        let mut base = first;
        while base <= last {
            if let Some(page) = pages.get_mut(&base) {
                page.protection = protection;
            }
            base += self.page_size;
        }
        self.protect_calls.borrow_mut().push(ProtectCall {
            address,
            len,
            protection,
        });
        Ok(previous)
    }

    fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize> {
        let page_size = self.page_size;
        let len = buf.len();
        self.transfer(
            address,
            len,
            |p| p.allows_read(),
            |page, offset, done| {
                let n = (len - done).min(page_size - offset);
                buf[done..done + n].copy_from_slice(&page.data[offset..offset + n]);
            },
        )
    }

    unsafe fn write(&self, address: Address, data: &[u8]) -> io::Result<usize> {
        let page_size = self.page_size;
        self.transfer(
            address,
            data.len(),
            |p| p.allows_write(),
            |page, offset, done| {
                let n = (data.len() - done).min(page_size - offset);
                page.data[offset..offset + n].copy_from_slice(&data[done..done + n]);
            },
        )
    }
}

#[derive(Debug, Default)]
pub struct MockMemoryBuilder {
    page_size: Option<usize>,
    pages: BTreeMap<Address, MockPage>,
    locked: HashSet<Address>,
    refused: HashSet<Protection>,
}

impl MockMemoryBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Map `count` pages starting at `base`, filled with `fill`.
    pub fn map(mut self, base: Address, count: usize, protection: Protection, fill: u8) -> Self {
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        assert_eq!(base % page_size, 0, "mock pages must be aligned");
        for i in 0..count {
            self.pages.insert(
                base + i * page_size,
                MockPage {
                    data: vec![fill; page_size],
                    protection,
                },
            );
        }
        self
    }

    /// Overwrite bytes of an already mapped range, ignoring protection.
    pub fn with_bytes(mut self, address: Address, bytes: &[u8]) -> Self {
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        for (i, byte) in bytes.iter().enumerate() {
            let a = address + i;
            let page = self
                .pages
                .get_mut(&(a - a % page_size))
                .expect("with_bytes on unmapped page");
            page.data[a % page_size] = *byte;
        }
        self
    }

    /// Refuse every protection change on the page at `base`.
    pub fn lock(mut self, base: Address) -> Self {
        self.locked.insert(base);
        self
    }

    /// Refuse every protection change to `protection`.
    pub fn refuse(mut self, protection: Protection) -> Self {
        self.refused.insert(protection);
        self
    }

    pub fn build(self) -> MockMemory {
        MockMemory {
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            pages: RefCell::new(self.pages),
            locked: self.locked,
            refused: self.refused,
            fail_queries: Cell::new(false),
            protect_calls: RefCell::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Address = 0x10000;

    #[test]
    fn test_query_merges_equal_pages() {
        let memory = MockMemory::builder()
            .map(BASE, 2, Protection::ReadWrite, 0)
            .map(BASE + 0x2000, 1, Protection::ReadOnly, 0)
            .build();

        let region = memory.query(BASE + 0x10).unwrap();
        assert_eq!(region.base, BASE);
        assert_eq!(region.size, 0x2000);
        assert_eq!(region.protection, Protection::ReadWrite);

        let free = memory.query(BASE + 0x3000).unwrap();
        assert_eq!(free.state, RegionState::Free);
    }

    #[test]
    fn test_read_stops_at_unreadable_page() {
        let memory = MockMemory::builder()
            .map(BASE, 1, Protection::ReadOnly, 0xAA)
            .map(BASE + 0x1000, 1, Protection::NoAccess, 0xBB)
            .build();

        let mut buf = [0u8; 32];
        let read = memory.read(BASE + 0x1000 - 16, &mut buf).unwrap();
        assert_eq!(read, 16);
        assert!(buf[..16].iter().all(|b| *b == 0xAA));
        assert!(memory.read(BASE + 0x1000, &mut buf).is_err());
    }

    #[test]
    fn test_write_requires_write_access() {
        let memory = MockMemory::builder()
            .map(BASE, 1, Protection::ExecuteRead, 0)
            .build();
        assert!(unsafe { memory.write(BASE, &[1, 2, 3]) }.is_err());
        assert_eq!(memory.mapped_bytes(BASE, 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_protect_locked_and_refused() {
        let memory = MockMemory::builder()
            .map(BASE, 2, Protection::ReadOnly, 0)
            .lock(BASE + 0x1000)
            .refuse(Protection::NoAccess)
            .build();

        let previous = unsafe { memory.protect(BASE, 16, Protection::ReadWrite) }.unwrap();
        assert_eq!(previous, Protection::ReadOnly);
        assert_eq!(memory.protection_at(BASE), Some(Protection::ReadWrite));

        assert!(unsafe { memory.protect(BASE + 0x1000, 16, Protection::ReadWrite) }.is_err());
        assert!(unsafe { memory.protect(BASE, 16, Protection::NoAccess) }.is_err());
        assert_eq!(memory.protect_calls().len(), 1);
    }
}
