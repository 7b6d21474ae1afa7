//! Linux-specific durability primitives.

use std::fs;
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

/// Resolve the device identity of an open file descriptor: the raw device
/// number and, when the descriptor refers to a device-DAX node, the DAX
/// region it belongs to.
pub(crate) fn device_of_fd(fd: c_int) -> Result<(u64, Option<u32>)> {
    let mut st: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut st) } != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    let dev = st.st_rdev as u64;
    Ok((dev, dax_region_of(dev)))
}

/// Write the final deep-flush step for a DAX region: data past the CPU
/// persistence domain are pushed to the medium through the region's
/// deep_flush control file.
pub(crate) fn deep_flush_final(region_id: u32) -> Result<()> {
    let path = format!("/sys/bus/nd/devices/region{}/deep_flush", region_id);
    fs::write(path, "1").map_err(Error::Io)
}

/// Device-DAX character nodes show up under /sys/dev/char as symlinks to
/// their dax<region>.<instance> device directory.
fn dax_region_of(dev: u64) -> Option<u32> {
    if dev == 0 {
        return None;
    }
    let major = libc::major(dev);
    let minor = libc::minor(dev);
    let link = fs::read_link(format!("/sys/dev/char/{}:{}", major, minor)).ok()?;
    let name = link.file_name()?.to_str()?;
    let region = name.strip_prefix("dax")?.split('.').next()?;
    region.parse().ok()
}
