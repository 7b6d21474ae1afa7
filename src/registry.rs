//! Registry of tracked persistent-memory mappings.
//!
//! An address-ordered set of disjoint half-open intervals, one per mapped
//! region the library has been told about. Readers (the pmem probe and
//! deep flush) take the lock shared and see a consistent snapshot; writers
//! (register, unregister, unmap) take it exclusive.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};

/// Per-entry flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackerFlags(u32);

impl TrackerFlags {
    /// The mapping refers to real byte-addressable persistent memory, not
    /// a page-cache file mapping.
    pub const DIRECT_MAPPED: TrackerFlags = TrackerFlags(0x0001);

    #[inline]
    pub fn contains(self, other: TrackerFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One contiguous tracked mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MapTracker {
    pub base_addr: usize,
    pub end_addr: usize,
    pub flags: TrackerFlags,
    /// Device the mapping was created from.
    pub dev_id: u64,
    /// DAX region the device belongs to, when it resolves to one.
    pub region_id: Option<u32>,
}

/// The interval set. Entries are keyed by base address, strictly ordered
/// and pairwise disjoint; adjacency is allowed but never merged.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: BTreeMap<usize, MapTracker>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            entries: BTreeMap::new(),
        }
    }

    /// Find the first tracker at least partially overlapping the given
    /// range. Ordering guarantees this is the lowest-address overlap; it is
    /// up to the caller to check whether the entry covers the whole range.
    pub fn find(&self, addr: usize, len: usize) -> Option<&MapTracker> {
        let end = addr + len;
        for mt in self.entries.values() {
            if addr < mt.end_addr && (addr >= mt.base_addr || end > mt.base_addr) {
                return Some(mt);
            }
            // entries are sorted, no chance of a match further up
            if addr < mt.base_addr {
                break;
            }
        }
        None
    }

    /// Insert a new tracker. Rejects any intersection with an existing
    /// entry; one overlap is enough to reject, so the first-overlap probe
    /// suffices.
    pub fn insert(&mut self, mt: MapTracker) -> Result<()> {
        debug_assert!(mt.base_addr < mt.end_addr);
        if self.find(mt.base_addr, mt.end_addr - mt.base_addr).is_some() {
            return Err(Error::OverlappingRange);
        }
        self.entries.insert(mt.base_addr, mt);
        Ok(())
    }

    /// Remove `[addr, addr + len)` from every tracker it intersects.
    /// Intersected trackers are split; bytes not covered by any tracker are
    /// ignored.
    pub fn remove_range(&mut self, addr: usize, len: usize) {
        let end = addr + len;
        while let Some(base) = self.find(addr, len).map(|mt| mt.base_addr) {
            self.split(base, addr, end);
        }
    }

    /// Remove the tracker keyed by `base`, re-inserting the parts outside
    /// the cut range `[addr, end)`:
    ///
    /// ```text
    /// 1)    a    e           a     e
    ///    xxxxxxxxxxxxx => xxx.......xxxx  -  left + right
    /// 2)       a     e           a     e
    ///    xxxxxxxxxxxxx => xxxxxxx.......  -  left
    /// 3) a     e          a      e
    ///    xxxxxxxxxxxxx => ........xxxxxx  -  right
    /// 4) a           e    a            e
    ///    xxxxxxxxxxxxx => ..............  -  none
    /// ```
    fn split(&mut self, base: usize, addr: usize, end: usize) {
        let Some(mt) = self.entries.remove(&base) else {
            return;
        };

        if addr > mt.base_addr {
            let left = MapTracker {
                base_addr: mt.base_addr,
                end_addr: addr,
                ..mt.clone()
            };
            self.entries.insert(left.base_addr, left);
        }

        if end < mt.end_addr {
            let right = MapTracker {
                base_addr: end,
                end_addr: mt.end_addr,
                ..mt
            };
            self.entries.insert(end, right);
        }
    }

    /// True iff every byte of the range is covered by direct-mapped
    /// trackers with no gap.
    pub fn is_pmem(&self, addr: usize, len: usize) -> bool {
        let mut addr = addr;
        let mut len = len;
        loop {
            let Some(mt) = self.find(addr, len) else {
                return false;
            };
            if mt.base_addr > addr {
                return false;
            }
            if !mt.flags.contains(TrackerFlags::DIRECT_MAPPED) {
                return false;
            }

            let covered = (mt.end_addr - addr).min(len);
            addr += covered;
            len -= covered;
            if len == 0 {
                return true;
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn spans(&self) -> Vec<(usize, usize)> {
        self.entries
            .values()
            .map(|mt| (mt.base_addr, mt.end_addr))
            .collect()
    }
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::new()));

pub(crate) fn read() -> Result<RwLockReadGuard<'static, Registry>> {
    REGISTRY.read().map_err(|_| Error::RegistryBusy)
}

pub(crate) fn write() -> Result<RwLockWriteGuard<'static, Registry>> {
    REGISTRY.write().map_err(|_| Error::RegistryBusy)
}

/// Resolve device identity and insert a tracker for `[addr, addr + len)`.
pub(crate) fn register(addr: usize, len: usize, dev_id: u64, region_id: Option<u32>) -> Result<()> {
    debug!(
        "registering mapping {:#x}..{:#x} dev {} region {:?}",
        addr,
        addr + len,
        dev_id,
        region_id
    );
    write()?.insert(MapTracker {
        base_addr: addr,
        end_addr: addr + len,
        flags: TrackerFlags::DIRECT_MAPPED,
        dev_id,
        region_id,
    })
}

/// Drop tracking for `[addr, addr + len)`.
pub(crate) fn unregister(addr: usize, len: usize) -> Result<()> {
    debug!("unregistering range {:#x}..{:#x}", addr, addr + len);
    write()?.remove_range(addr, len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(base: usize, end: usize) -> MapTracker {
        MapTracker {
            base_addr: base,
            end_addr: end,
            flags: TrackerFlags::DIRECT_MAPPED,
            dev_id: 0,
            region_id: None,
        }
    }

    #[test]
    fn insert_then_find_mid() {
        let mut reg = Registry::new();
        reg.insert(tracker(0x1000, 0x3000)).unwrap();
        let mt = reg.find(0x2000, 1).unwrap();
        assert_eq!((mt.base_addr, mt.end_addr), (0x1000, 0x3000));
    }

    #[test]
    fn find_returns_lowest_overlap() {
        let mut reg = Registry::new();
        reg.insert(tracker(100, 200)).unwrap();
        reg.insert(tracker(300, 400)).unwrap();
        let mt = reg.find(150, 300).unwrap();
        assert_eq!(mt.base_addr, 100);
    }

    #[test]
    fn overlap_insert_rejected() {
        let mut reg = Registry::new();
        reg.insert(tracker(0, 100)).unwrap();
        assert!(matches!(
            reg.insert(tracker(50, 150)),
            Err(Error::OverlappingRange)
        ));
        // adjacency is fine
        reg.insert(tracker(100, 200)).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn unregister_middle_splits_in_two() {
        let mut reg = Registry::new();
        reg.insert(tracker(0, 100)).unwrap();
        reg.remove_range(20, 30);
        assert_eq!(reg.spans(), vec![(0, 20), (50, 100)]);

        // a query from inside the hole spanning into the upper remainder
        // lands on the upper remainder
        let mt = reg.find(25, 30).unwrap();
        assert_eq!(mt.base_addr, 50);
        // a point query inside the hole finds nothing
        assert!(reg.find(25, 0).is_none());
        // the low remainder still resolves
        assert_eq!(reg.find(10, 5).unwrap().base_addr, 0);
        assert_eq!(reg.find(60, 1).unwrap().base_addr, 50);
    }

    #[test]
    fn unregister_spanning_splits_case_four() {
        let mut reg = Registry::new();
        reg.insert(tracker(0, 100)).unwrap();
        reg.remove_range(30, 40);
        assert_eq!(reg.spans(), vec![(0, 30), (70, 100)]);
        assert_eq!(reg.find(50, 5).unwrap().base_addr, 70);
    }

    #[test]
    fn unregister_low_and_high_edges() {
        let mut reg = Registry::new();
        reg.insert(tracker(1000, 2000)).unwrap();
        reg.remove_range(500, 700); // overlaps the low end
        assert_eq!(reg.spans(), vec![(1200, 2000)]);
        reg.remove_range(1800, 400); // overlaps the high end
        assert_eq!(reg.spans(), vec![(1200, 1800)]);
    }

    #[test]
    fn unregister_across_multiple_entries() {
        let mut reg = Registry::new();
        reg.insert(tracker(0, 100)).unwrap();
        reg.insert(tracker(200, 300)).unwrap();
        reg.insert(tracker(400, 500)).unwrap();
        reg.remove_range(50, 400);
        assert_eq!(reg.spans(), vec![(0, 50), (450, 500)]);
    }

    #[test]
    fn register_unregister_restores_registry() {
        let mut reg = Registry::new();
        reg.insert(tracker(0x5000, 0x6000)).unwrap();
        let before = reg.spans();
        reg.insert(tracker(0x8000, 0x9000)).unwrap();
        reg.remove_range(0x8000, 0x1000);
        assert_eq!(reg.spans(), before);
    }

    #[test]
    fn unregister_uncovered_is_noop() {
        let mut reg = Registry::new();
        reg.insert(tracker(100, 200)).unwrap();
        reg.remove_range(300, 100);
        assert_eq!(reg.spans(), vec![(100, 200)]);
    }

    #[test]
    fn detect_requires_full_direct_coverage() {
        let mut reg = Registry::new();
        reg.insert(tracker(0x10000, 0x20000)).unwrap();
        assert!(reg.is_pmem(0x18000, 0x1000));
        assert!(reg.is_pmem(0x10000, 0x10000));
        // exits the tracked region
        assert!(!reg.is_pmem(0x1F000, 0x2000));
        assert!(!reg.is_pmem(0x8000, 0x1000));
    }

    #[test]
    fn detect_spans_adjacent_entries() {
        let mut reg = Registry::new();
        reg.insert(tracker(0x1000, 0x2000)).unwrap();
        reg.insert(tracker(0x2000, 0x3000)).unwrap();
        assert!(reg.is_pmem(0x1800, 0x1000));

        // a hole in the middle breaks coverage
        reg.remove_range(0x1f00, 0x100);
        assert!(!reg.is_pmem(0x1800, 0x1000));
    }

    #[test]
    fn detect_honours_flag_bit() {
        let mut reg = Registry::new();
        let mut mt = tracker(0x1000, 0x2000);
        mt.flags = TrackerFlags(0);
        reg.insert(mt).unwrap();
        assert!(!reg.is_pmem(0x1000, 0x100));
    }
}
