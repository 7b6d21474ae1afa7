//! macOS-specific durability primitives.
//!
//! There are no DAX regions here; deep flush degrades to the page-cache
//! sync the caller performs for untracked ranges.

use std::io;
use std::mem;
use std::os::raw::c_int;

use libc::c_void;

use crate::error::{Error, Result};

/// Synchronize a mapped range with its backing store.
///
/// # Safety
///
/// `addr` must be page-aligned and `[addr, addr + len)` must lie within a
/// mapping of this process.
pub(crate) unsafe fn msync(addr: *const u8, len: usize) -> Result<()> {
    if libc::msync(addr as *mut c_void, len, libc::MS_SYNC) != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Unmap a mapped range.
///
/// # Safety
///
/// `[addr, addr + len)` must be a mapping of this process that is no longer
/// accessed.
pub(crate) unsafe fn unmap(addr: *mut u8, len: usize) -> Result<()> {
    if libc::munmap(addr as *mut c_void, len) != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Resolve the device identity of an open file descriptor.
pub(crate) fn device_of_fd(fd: c_int) -> Result<(u64, Option<u32>)> {
    let mut st: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut st) } != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok((st.st_rdev as u64, None))
}

pub(crate) fn deep_flush_final(_region_id: u32) -> Result<()> {
    Err(Error::Unsupported)
}
