//! `/proc/self/maps` parsing.

use std::borrow::Borrow;
use std::fs;
use std::io;
use std::path::Path;

use crate::backend::Address;
use crate::protection::{Protection, Region, RegionState};

const SELF_MAPS: &str = "/proc/self/maps";

/// One line of a maps file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MapEntry {
    pub start: Address,
    pub end: Address,
    pub protection: Protection,
    pub shared: bool,
    pub offset: u64,
    pub pathname: Option<String>,
}

impl MapEntry {
    /// Final path component of the backing file, if any.
    pub fn file_name(&self) -> Option<&str> {
        let pathname = self.pathname.as_deref()?;
        if pathname.starts_with('[') {
            return None;
        }
        Path::new(pathname).file_name().and_then(|name| name.to_str())
    }
}

/// Read the mappings of the current process, sorted by start address.
pub(crate) fn read_self_maps() -> io::Result<Vec<MapEntry>> {
    let content = fs::read_to_string(SELF_MAPS)?;
    Ok(content.lines().filter_map(parse_line).collect())
}

/// Region of the current process containing `address`.
///
/// Reads `/proc/self/maps` once and parses lines only up to the one that
/// decides the answer.
pub(crate) fn query_self(address: Address) -> io::Result<Region> {
    let content = fs::read_to_string(SELF_MAPS)?;
    Ok(region_at(content.lines().filter_map(parse_line), address))
}

/// Parse a line such as
/// `7f1c2a000000-7f1c2a021000 r-xp 00001000 08:01 1234    /usr/lib/libc.so.6`.
pub(crate) fn parse_line(line: &str) -> Option<MapEntry> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?.as_bytes();
    let offset = fields.next()?;
    let _dev = fields.next()?;
    let _inode = fields.next()?;
    let pathname: Vec<&str> = fields.collect();

    let (start, end) = range.split_once('-')?;
    let start = Address::from_str_radix(start, 16).ok()?;
    let end = Address::from_str_radix(end, 16).ok()?;
    if end <= start || perms.len() < 4 {
        return None;
    }

    Some(MapEntry {
        start,
        end,
        protection: Protection::from_flags(perms[0] == b'r', perms[1] == b'w', perms[2] == b'x'),
        shared: perms[3] == b's',
        offset: u64::from_str_radix(offset, 16).ok()?,
        pathname: (!pathname.is_empty()).then(|| pathname.join(" ")),
    })
}

/// Find the region containing `address`.
///
/// Addresses between mappings are reported as a free region spanning the
/// whole gap, the way `VirtualQuery` reports unallocated space.
pub(crate) fn region_at<I>(entries: I, address: Address) -> Region
where
    I: IntoIterator,
    I::Item: Borrow<MapEntry>,
{
    let mut gap_start = 0;
    for entry in entries {
        let entry = entry.borrow();
        if address < entry.start {
            return free(gap_start, entry.start);
        }
        if address < entry.end {
            return Region {
                base: entry.start,
                size: entry.end - entry.start,
                state: RegionState::Committed,
                protection: entry.protection,
            };
        }
        gap_start = entry.end;
    }
    free(gap_start, Address::MAX)
}

fn free(start: Address, end: Address) -> Region {
    Region {
        base: start,
        size: end - start,
        state: RegionState::Free,
        protection: Protection::NoAccess,
    }
}

#[cfg(all(test, target_pointer_width = "64"))]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
55d0c4a00000-55d0c4a02000 r--p 00000000 08:01 131090                     /usr/bin/cat
55d0c4a02000-55d0c4a07000 r-xp 00002000 08:01 131090                     /usr/bin/cat
55d0c5c3e000-55d0c5c5f000 rw-p 00000000 00:00 0                          [heap]
7f3a1c000000-7f3a1c001000 ---p 00000000 00:00 0
7f3a1c200000-7f3a1c201000 rw-s 00000000 00:05 42                         /memfd:shared buf (deleted)
";

    fn sample() -> Vec<MapEntry> {
        SAMPLE.lines().filter_map(parse_line).collect()
    }

    #[test]
    fn test_parse_line_fields() {
        let entries = sample();
        assert_eq!(entries.len(), 5);

        let text = &entries[1];
        assert_eq!(text.start, 0x55d0c4a02000);
        assert_eq!(text.end, 0x55d0c4a07000);
        assert_eq!(text.protection, Protection::ExecuteRead);
        assert_eq!(text.offset, 0x2000);
        assert!(!text.shared);
        assert_eq!(text.file_name(), Some("cat"));
    }

    #[test]
    fn test_parse_line_pseudo_and_anonymous() {
        let entries = sample();
        assert_eq!(entries[2].pathname.as_deref(), Some("[heap]"));
        assert_eq!(entries[2].file_name(), None);
        assert_eq!(entries[3].pathname, None);
        assert_eq!(entries[3].protection, Protection::NoAccess);
    }

    #[test]
    fn test_parse_line_pathname_with_spaces() {
        let entries = sample();
        assert!(entries[4].shared);
        assert_eq!(
            entries[4].pathname.as_deref(),
            Some("/memfd:shared buf (deleted)")
        );
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("not a maps line"), None);
        assert_eq!(parse_line("2000-1000 rw-p 00000000 00:00 0"), None);
    }

    #[test]
    fn test_region_at_mapped() {
        let region = region_at(&sample(), 0x55d0c5c40000);
        assert_eq!(region.base, 0x55d0c5c3e000);
        assert_eq!(region.size, 0x21000);
        assert_eq!(region.state, RegionState::Committed);
        assert_eq!(region.protection, Protection::ReadWrite);
    }

    #[test]
    fn test_region_at_gap() {
        let region = region_at(&sample(), 0x55d0c4a07000);
        assert_eq!(region.base, 0x55d0c4a07000);
        assert_eq!(region.end(), 0x55d0c5c3e000);
        assert_eq!(region.state, RegionState::Free);
    }

    #[test]
    fn test_region_at_edges() {
        let below = region_at(&sample(), 0x1000);
        assert_eq!(below.base, 0);
        assert_eq!(below.state, RegionState::Free);

        let above = region_at(&sample(), 0x7fff_0000_0000);
        assert_eq!(above.base, 0x7f3a1c201000);
        assert_eq!(above.end(), Address::MAX);
    }

    #[test]
    fn test_region_at_streamed_lines() {
        let entries = sample();
        for address in [0x1000, 0x55d0c4a01fff, 0x55d0c4a07000, 0x7f3a1c000000, 0x7fff_0000_0000] {
            let streamed = region_at(SAMPLE.lines().filter_map(parse_line), address);
            assert_eq!(streamed, region_at(&entries, address));
        }
    }

    #[test]
    fn test_query_self_sees_own_stack() {
        let marker = 0u64;
        let address = &marker as *const u64 as Address;
        let region = query_self(address).unwrap();
        assert!(region.is_committed());
        assert!(region.covers(address, 8));
    }

    #[test]
    fn test_read_self_maps_sees_own_stack() {
        let marker = 0u64;
        let address = &marker as *const u64 as Address;
        let entries = read_self_maps().unwrap();
        let region = region_at(&entries, address);
        assert!(region.is_committed());
        assert!(region.protection.allows_write());
    }
}
