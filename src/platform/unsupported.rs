//! Fallback durability primitives for unsupported platforms.

use std::os::raw::c_int;

use crate::error::{Error, Result};

pub(crate) unsafe fn msync(_addr: *const u8, _len: usize) -> Result<()> {
    Err(Error::Unsupported)
}

pub(crate) unsafe fn unmap(_addr: *mut u8, _len: usize) -> Result<()> {
    Err(Error::Unsupported)
}

pub(crate) fn device_of_fd(_fd: c_int) -> Result<(u64, Option<u32>)> {
    Err(Error::Unsupported)
}

pub(crate) fn deep_flush_final(_region_id: u32) -> Result<()> {
    Err(Error::Unsupported)
}
