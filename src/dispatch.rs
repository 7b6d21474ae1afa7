//! Runtime capability detection and per-process dispatch.
//!
//! All decisions about which flush instruction, which pre-drain fence and
//! which transfer variant to use are made once, when the dispatch record is
//! first touched, and never again. Callers go through plain function
//! pointers with no per-call branching.
//!
//! ```text
//! Priority  Flush          Requirement          Fence
//! ────────  ─────────────  ───────────────────  ──────
//! 1         clwb           CPUID.7.0:EBX[24]    sfence
//! 2         clflushopt     CPUID.7.0:EBX[23]    sfence
//! 3         clflush        CPUID.1:EDX[19]      none
//! 4         none           PMEM_NO_FLUSH=1      sfence
//! ```

use std::ptr;

use log::debug;
use once_cell::sync::Lazy;

use crate::config::EnvKnobs;
use crate::flush;

pub(crate) type FlushFn = unsafe fn(*const u8, usize);
pub(crate) type FenceFn = fn();
pub(crate) type MemmoveFn = unsafe fn(*mut u8, *const u8, usize);
pub(crate) type MemsetFn = unsafe fn(*mut u8, u8, usize);

/// Which cache-line flush instruction ended up installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushKind {
    Clflush,
    Clflushopt,
    Clwb,
    Empty,
}

/// The per-process dispatch record. Published exactly once; every field is
/// fixed for the process lifetime.
pub(crate) struct Dispatch {
    pub flush: FlushFn,
    pub predrain_fence: FenceFn,
    pub memmove_nodrain: MemmoveFn,
    pub memset_nodrain: MemsetFn,
    pub movnt_threshold: usize,
    pub clflush_present: bool,
    pub flush_kind: FlushKind,
    pub movnt: bool,
}

static DISPATCH: Lazy<Dispatch> = Lazy::new(detect);

#[inline]
pub(crate) fn dispatch() -> &'static Dispatch {
    &DISPATCH
}

/// memmove to pmem without hw drain: plain copy, then flush.
pub(crate) unsafe fn memmove_nodrain_scalar(dest: *mut u8, src: *const u8, len: usize) {
    ptr::copy(src, dest, len);
    (dispatch().flush)(dest as *const u8, len);
}

/// memset to pmem without hw drain: plain fill, then flush.
pub(crate) unsafe fn memset_nodrain_scalar(dest: *mut u8, c: u8, len: usize) {
    ptr::write_bytes(dest, c, len);
    (dispatch().flush)(dest as *const u8, len);
}

#[cfg(target_arch = "x86_64")]
fn detect() -> Dispatch {
    let knobs = EnvKnobs::from_env();

    let mut flush_fn: FlushFn = flush::flush_clflush;
    let mut fence_fn: FenceFn = flush::predrain_fence_empty;
    let mut flush_kind = FlushKind::Clflush;

    let clflush_present = cpu::has_clflush();
    if clflush_present {
        debug!("clflush supported");
    }

    if cpu::has_clflushopt() {
        debug!("clflushopt supported");
        if knobs.no_clflushopt {
            debug!("PMEM_NO_CLFLUSHOPT forced no clflushopt");
        } else {
            flush_fn = flush::flush_clflushopt;
            fence_fn = flush::predrain_fence_sfence;
            flush_kind = FlushKind::Clflushopt;
        }
    }

    if cpu::has_clwb() {
        debug!("clwb supported");
        if knobs.no_clwb {
            debug!("PMEM_NO_CLWB forced no clwb");
        } else {
            flush_fn = flush::flush_clwb;
            fence_fn = flush::predrain_fence_sfence;
            flush_kind = FlushKind::Clwb;
        }
    }

    if knobs.no_flush {
        debug!("forced not flushing CPU cache");
        flush_fn = flush::flush_empty;
        fence_fn = flush::predrain_fence_sfence;
        flush_kind = FlushKind::Empty;
    }

    // Streaming stores need nothing beyond SSE2, which is baseline on
    // x86_64, so they are on unless explicitly disabled.
    let mut memmove_fn: MemmoveFn = memmove_nodrain_scalar;
    let mut memset_fn: MemsetFn = memset_nodrain_scalar;
    let mut movnt = false;
    if knobs.no_movnt {
        debug!("PMEM_NO_MOVNT forced no movnt");
    } else {
        memmove_fn = crate::movnt::memmove_nodrain_movnt;
        memset_fn = crate::movnt::memset_nodrain_movnt;
        movnt = true;
    }

    let d = Dispatch {
        flush: flush_fn,
        predrain_fence: fence_fn,
        memmove_nodrain: memmove_fn,
        memset_nodrain: memset_fn,
        movnt_threshold: knobs.movnt_threshold,
        clflush_present,
        flush_kind,
        movnt,
    };
    log_cpuinfo(&d);
    d
}

#[cfg(not(target_arch = "x86_64"))]
fn detect() -> Dispatch {
    let knobs = EnvKnobs::from_env();

    // No cache-line flush or streaming-store instructions here; durability
    // comes from msync, and drain still fences so later stores cannot be
    // reordered ahead.
    let d = Dispatch {
        flush: flush::flush_empty,
        predrain_fence: flush::predrain_fence_sfence,
        memmove_nodrain: memmove_nodrain_scalar,
        memset_nodrain: memset_nodrain_scalar,
        movnt_threshold: knobs.movnt_threshold,
        clflush_present: false,
        flush_kind: FlushKind::Empty,
        movnt: false,
    };
    log_cpuinfo(&d);
    d
}

/// Log the dispatching decisions once, at init.
fn log_cpuinfo(d: &Dispatch) {
    match d.flush_kind {
        FlushKind::Clwb => debug!("using clwb"),
        FlushKind::Clflushopt => debug!("using clflushopt"),
        FlushKind::Clflush => debug!("using clflush"),
        FlushKind::Empty => debug!("not flushing CPU cache"),
    }
    if d.movnt {
        debug!("using movnt, threshold {}", d.movnt_threshold);
    } else {
        debug!("not using movnt");
    }
}

/// CPUID feature probes for the instructions the dispatch cares about.
#[cfg(target_arch = "x86_64")]
mod cpu {
    use core::arch::x86_64::{__cpuid, __cpuid_count};

    pub(super) fn has_clflush() -> bool {
        unsafe { __cpuid(1) }.edx & (1 << 19) != 0
    }

    pub(super) fn has_clflushopt() -> bool {
        leaf7_ebx() & (1 << 23) != 0
    }

    pub(super) fn has_clwb() -> bool {
        leaf7_ebx() & (1 << 24) != 0
    }

    fn leaf7_ebx() -> u32 {
        if unsafe { __cpuid(0) }.eax < 7 {
            return 0;
        }
        unsafe { __cpuid_count(7, 0) }.ebx
    }
}
