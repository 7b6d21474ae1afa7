//! # pmembase
//!
//! `pmembase` provides durable store primitives over byte-addressable
//! persistent memory mapped directly into the process address space.
//!
//! ## Features
//!
//! - Cache-line flush, drain and persist with the cheapest instruction the
//!   CPU offers (clwb, clflushopt, clflush), chosen once at init
//! - Bulk memmove/memcpy/memset variants that switch to cache-bypassing
//!   streaming stores for large ranges
//! - A registry of tracked mappings answering whether a range is entirely
//!   persistent memory
//! - Device-level deep flush routing DAX portions to their region's
//!   deep-flush mechanism and everything else to the page-cache sync
//! - Environment overrides for every dispatch decision
//!
//! ## Example
//!
//! ```
//! let src = vec![0xA5u8; 4096];
//! let mut dst = vec![0u8; 4096];
//!
//! // Copy and make the destination range durable in one call. On ordinary
//! // DRAM the flush is simply harmless.
//! unsafe {
//!     pmembase::memcpy_persist(dst.as_mut_ptr(), src.as_ptr(), src.len());
//! }
//! assert_eq!(dst, src);
//! ```

pub mod error;
pub mod pmem;
pub mod utils;

mod config;
mod dispatch;
mod flush;
#[cfg(target_arch = "x86_64")]
mod movnt;
mod platform;
mod registry;

pub use error::{Error, Result};
pub use pmem::{
    deep_flush, drain, flush, has_hw_drain, is_pmem, map_range_register, map_range_unregister,
    memcpy_nodrain, memcpy_persist, memmove_nodrain, memmove_persist, memset_nodrain,
    memset_persist, msync, persist, unmap,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if streaming-store transfers are in use for large ranges.
#[inline]
pub fn has_movnt_support() -> bool {
    dispatch::dispatch().movnt
}
