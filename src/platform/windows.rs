//! Windows-specific durability primitives.

use std::io;
use std::os::raw::c_int;

use winapi::shared::minwindef::LPVOID;
use winapi::um::memoryapi::{FlushViewOfFile, UnmapViewOfFile};

use crate::error::{Error, Result};

/// Synchronize a mapped view with its backing store.
///
/// # Safety
///
/// `addr` must be page-aligned and `[addr, addr + len)` must lie within a
/// mapped view of this process.
pub(crate) unsafe fn msync(addr: *const u8, len: usize) -> Result<()> {
    if FlushViewOfFile(addr as LPVOID, len) == 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Unmap a mapped view. The whole view is released regardless of `len`.
///
/// # Safety
///
/// `addr` must be the base of a mapped view of this process that is no
/// longer accessed.
pub(crate) unsafe fn unmap(addr: *mut u8, _len: usize) -> Result<()> {
    if UnmapViewOfFile(addr as LPVOID) == 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// There is no device identity to resolve on Windows; nothing is ever
/// routed to a deep-flush control file.
pub(crate) fn device_of_fd(_fd: c_int) -> Result<(u64, Option<u32>)> {
    Ok((0, None))
}

pub(crate) fn deep_flush_final(_region_id: u32) -> Result<()> {
    Err(Error::Unsupported)
}
