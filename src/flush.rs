//! Cache-line flush and store-fence primitives.
//!
//! Every variant walks the cache-line-size (64 B) aligned chunks covering
//! the given range and issues one flush instruction per line. Which variant
//! ends up behind `pmem::flush` is decided once by the capability probe.

/// Flush/invalidate granularity of the CPU cache.
pub(crate) const FLUSH_ALIGN: usize = 64;

/// Do not flush the CPU cache.
pub(crate) unsafe fn flush_empty(_addr: *const u8, _len: usize) {}

/// Pre-drain fence for the clflush path. clflush is ordered with respect
/// to other stores on its own, so there is nothing to do.
pub(crate) fn predrain_fence_empty() {}

#[cfg(target_arch = "x86_64")]
pub(crate) use x86::{flush_clflush, flush_clflushopt, flush_clwb, predrain_fence_sfence};

#[cfg(target_arch = "x86_64")]
mod x86 {
    use core::arch::asm;
    use core::arch::x86_64::{_mm_clflush, _mm_sfence};

    use super::FLUSH_ALIGN;

    /// Flush the CPU cache for the given range, using clflush.
    pub(crate) unsafe fn flush_clflush(addr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        let mut line = addr as usize & !(FLUSH_ALIGN - 1);
        let end = addr as usize + len;
        while line < end {
            _mm_clflush(line as *const u8);
            line += FLUSH_ALIGN;
        }
    }

    /// Flush the CPU cache for the given range, using clflushopt.
    pub(crate) unsafe fn flush_clflushopt(addr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        let mut line = addr as usize & !(FLUSH_ALIGN - 1);
        let end = addr as usize + len;
        while line < end {
            clflushopt_line(line as *const u8);
            line += FLUSH_ALIGN;
        }
    }

    /// Flush the CPU cache for the given range, using clwb.
    pub(crate) unsafe fn flush_clwb(addr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        let mut line = addr as usize & !(FLUSH_ALIGN - 1);
        let end = addr as usize + len;
        while line < end {
            clwb_line(line as *const u8);
            line += FLUSH_ALIGN;
        }
    }

    /// Pre-drain fence for the clflushopt/clwb paths: sfence ensures the
    /// weakly ordered flushes above have completed.
    pub(crate) fn predrain_fence_sfence() {
        unsafe { _mm_sfence() };
    }

    // clflushopt and clwb are emitted through asm; the corresponding
    // compiler intrinsics are gated behind target features the binary is
    // not built with, while the instructions themselves are valid on any
    // CPU that reports them.

    #[inline]
    unsafe fn clflushopt_line(p: *const u8) {
        asm!("clflushopt [{0}]", in(reg) p, options(nostack, preserves_flags));
    }

    #[inline]
    unsafe fn clwb_line(p: *const u8) {
        asm!("clwb [{0}]", in(reg) p, options(nostack, preserves_flags));
    }
}

/// Pre-drain fence on targets without sfence: a full memory fence keeps
/// later stores from being reordered ahead of the drained ones.
#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn predrain_fence_sfence() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}
