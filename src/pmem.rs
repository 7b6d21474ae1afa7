//! Durable store primitives over byte-addressable persistent memory.
//!
//! Three interfaces flush a range so that callers can separate the steps
//! when necessary:
//!
//! - [`persist`]: the common case, equivalent to [`flush`] then [`drain`].
//! - [`flush`]: one cache-line writeback per line of the range.
//! - [`drain`]: wait for flushed/streamed stores to reach the persistence
//!   domain.
//!
//! The transfer entry points ([`memmove_nodrain`] and friends) combine the
//! copy with the flush flow, switching to cache-bypassing streaming stores
//! for large ranges. [`msync`] and [`deep_flush`] provide the page-cache
//! and device-level durability paths, and the `map_range_*` calls maintain
//! the registry that [`is_pmem`] and [`deep_flush`] consult.

use std::os::raw::c_int;

use log::trace;
use once_cell::sync::OnceCell;

use crate::config::{self, ForcedIsPmem};
use crate::dispatch;
use crate::error::Result;
use crate::platform;
use crate::registry;
use crate::utils::alignment;

/// Flush the processor cache for the given range.
///
/// One writeback instruction is issued per 64-byte cache line intersecting
/// `[addr, addr + len)`. Which instruction that is was decided at init.
/// A zero-length range is a no-op.
///
/// # Safety
///
/// `[addr, addr + len)` must lie within a mapping of this process.
#[inline]
pub unsafe fn flush(addr: *const u8, len: usize) {
    if len == 0 {
        return;
    }
    (dispatch::dispatch().flush)(addr, len);
}

/// Wait for any persistent-memory stores to drain from hardware buffers.
///
/// Issues the pre-drain fence matching the installed flush instruction:
/// nothing for clflush, sfence for the weakly ordered clflushopt/clwb and
/// no-flush paths.
#[inline]
pub fn drain() {
    (dispatch::dispatch().predrain_fence)();
}

/// Make any cached changes to a range of pmem persistent.
///
/// Equivalent to `flush(addr, len)` followed by `drain()`.
///
/// # Safety
///
/// `[addr, addr + len)` must lie within a mapping of this process.
#[inline]
pub unsafe fn persist(addr: *const u8, len: usize) {
    flush(addr, len);
    drain();
}

/// Whether a hardware drain step exists on this platform.
///
/// Always false on x86: draining to the persistence domain is done by
/// hardware with no software involvement.
#[inline]
pub fn has_hw_drain() -> bool {
    false
}

/// Flush a range to persistence through the page cache.
///
/// Less optimal for pmem than [`persist`], but also correct for any
/// memory-mapped file, unlike [`persist`] which is only safe where
/// [`is_pmem`] returns true. The start address is rounded down to page
/// granularity and the length grown to match, as the OS sync primitive
/// requires. A zero-length range succeeds immediately.
///
/// # Safety
///
/// `[addr, addr + len)` must lie within a mapping of this process.
pub unsafe fn msync(addr: *const u8, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }

    // grow len by the amount gained when rounding addr down
    let page = alignment::page_size();
    let base = alignment::align_down(addr as usize, page);
    let len = len + (addr as usize - base);

    platform::msync(base as *const u8, len)
}

/// Latched `is_pmem` policy, evaluated on the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IsPmemPolicy {
    Always,
    Never,
    Detect,
}

static IS_PMEM_POLICY: OnceCell<IsPmemPolicy> = OnceCell::new();

/// Return true if the entire range is persistent memory.
///
/// True only when every byte of `[addr, addr + len)` is covered by tracked
/// direct mappings. The answer can be forced either way with the
/// `PMEM_IS_PMEM_FORCE` environment variable, which is consulted once, on
/// the first call.
pub fn is_pmem(addr: *const u8, len: usize) -> bool {
    let policy = IS_PMEM_POLICY.get_or_init(|| match config::is_pmem_force() {
        Some(ForcedIsPmem::Always) => {
            trace!("PMEM_IS_PMEM_FORCE=1");
            IsPmemPolicy::Always
        }
        Some(ForcedIsPmem::Never) => {
            trace!("PMEM_IS_PMEM_FORCE=0");
            IsPmemPolicy::Never
        }
        None => IsPmemPolicy::Detect,
    });

    match policy {
        IsPmemPolicy::Always => true,
        IsPmemPolicy::Never => false,
        IsPmemPolicy::Detect => {
            if !dispatch::dispatch().clflush_present {
                return false;
            }
            match registry::read() {
                Ok(reg) => reg.is_pmem(addr as usize, len),
                Err(_) => false,
            }
        }
    }
}

/// Perform a deep flush on a memory range.
///
/// Stronger than [`persist`]: the data reach the storage controller, not
/// merely the CPU persistence domain. Tracked DAX portions go through the
/// device's deep-flush mechanism; everything else goes through [`msync`].
/// The registry is held shared for the whole walk, so the region set
/// cannot change mid-operation.
///
/// # Safety
///
/// `[addr, addr + len)` must lie within a mapping of this process.
pub unsafe fn deep_flush(addr: *const u8, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }

    let reg = registry::read()?;
    let mut addr = addr as usize;
    let mut len = len;

    while len != 0 {
        let Some(mt) = reg.find(addr, len) else {
            // no more overlapping tracked regions
            return msync(addr as *const u8, len);
        };
        trace!(
            "deep flush {:#x}..{:#x} through tracked {:#x}..{:#x}",
            addr,
            addr + len,
            mt.base_addr,
            mt.end_addr
        );

        if mt.base_addr > addr {
            let head = (mt.base_addr - addr).min(len);
            msync(addr as *const u8, head)?;
            len -= head;
            if len == 0 {
                return Ok(());
            }
            addr = mt.base_addr;
        }

        match mt.region_id {
            Some(region) => platform::deep_flush_final(region)?,
            // tracked, but not backed by a DAX region
            None => {
                let span = (mt.end_addr - addr).min(len);
                msync(addr as *const u8, span)?;
            }
        }

        if mt.end_addr >= addr + len {
            return Ok(());
        }
        len -= mt.end_addr - addr;
        addr = mt.end_addr;
    }

    Ok(())
}

/// memmove to pmem without hw drain.
///
/// Overlapping ranges are handled; the copy direction is chosen so source
/// bytes are read before they are overwritten. On return the destination
/// range has been flushed but not drained: stores may still sit in cache
/// or write-combining buffers until the next [`drain`].
///
/// # Safety
///
/// `[pmemdest, pmemdest + len)` must lie within a writable mapping and
/// `[src, src + len)` within a readable one.
#[inline]
pub unsafe fn memmove_nodrain(pmemdest: *mut u8, src: *const u8, len: usize) {
    if len == 0 || src == pmemdest as *const u8 {
        return;
    }
    (dispatch::dispatch().memmove_nodrain)(pmemdest, src, len);
}

/// memcpy to pmem without hw drain.
///
/// # Safety
///
/// As [`memmove_nodrain`]; overlapping input is tolerated because the copy
/// goes through the same engine.
#[inline]
pub unsafe fn memcpy_nodrain(pmemdest: *mut u8, src: *const u8, len: usize) {
    memmove_nodrain(pmemdest, src, len);
}

/// memmove to pmem. On return the destination range is durable.
///
/// # Safety
///
/// As [`memmove_nodrain`].
#[inline]
pub unsafe fn memmove_persist(pmemdest: *mut u8, src: *const u8, len: usize) {
    memmove_nodrain(pmemdest, src, len);
    drain();
}

/// memcpy to pmem. On return the destination range is durable.
///
/// # Safety
///
/// As [`memmove_nodrain`].
#[inline]
pub unsafe fn memcpy_persist(pmemdest: *mut u8, src: *const u8, len: usize) {
    memcpy_nodrain(pmemdest, src, len);
    drain();
}

/// memset to pmem without hw drain. Only the low byte of `c` is stored.
///
/// # Safety
///
/// `[pmemdest, pmemdest + len)` must lie within a writable mapping.
#[inline]
pub unsafe fn memset_nodrain(pmemdest: *mut u8, c: i32, len: usize) {
    if len == 0 {
        return;
    }
    (dispatch::dispatch().memset_nodrain)(pmemdest, c as u8, len);
}

/// memset to pmem. On return the destination range is durable.
///
/// # Safety
///
/// As [`memset_nodrain`].
#[inline]
pub unsafe fn memset_persist(pmemdest: *mut u8, c: i32, len: usize) {
    memset_nodrain(pmemdest, c, len);
    drain();
}

/// Start tracking a mapped persistent-memory range.
///
/// The device and DAX region identity are resolved from `fd`, the
/// descriptor the mapping was created from. Fails with
/// [`Error::OverlappingRange`](crate::Error::OverlappingRange) if any byte
/// of the range is already tracked.
pub fn map_range_register(addr: *const u8, len: usize, fd: c_int) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let (dev_id, region_id) = platform::device_of_fd(fd)?;
    registry::register(addr as usize, len, dev_id, region_id)
}

/// Stop tracking a mapped range.
///
/// Tracked entries partially covered by the range are split; bytes that
/// were never registered are ignored.
pub fn map_range_unregister(addr: *const u8, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    registry::unregister(addr as usize, len)
}

/// Unmap the specified region.
///
/// The registry entry goes first and the OS mapping second, so a
/// concurrent [`is_pmem`] can never observe an address that is tracked but
/// already unmapped.
///
/// # Safety
///
/// `[addr, addr + len)` must be a mapping of this process that is no
/// longer accessed.
pub unsafe fn unmap(addr: *mut u8, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    map_range_unregister(addr as *const u8, len)?;
    platform::unmap(addr, len)
}
