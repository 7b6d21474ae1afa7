//! Memory alignment utilities.
//!
//! This module provides utilities for working with memory alignment.

/// Round up to the next multiple of `align`.
///
/// # Arguments
///
/// * `value` - The value to round up.
/// * `align` - The alignment, which must be a power of two.
#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
    (value + align - 1) & !(align - 1)
}

/// Round down to the previous multiple of `align`.
///
/// # Arguments
///
/// * `value` - The value to round down.
/// * `align` - The alignment, which must be a power of two.
#[inline]
pub fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
    value & !(align - 1)
}

/// Check if a value is aligned to a given alignment.
#[inline]
pub fn is_aligned(value: usize, align: usize) -> bool {
    debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
    (value & (align - 1)) == 0
}

/// Get the system page size.
#[inline]
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    #[cfg(windows)]
    {
        use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};

        unsafe {
            let mut system_info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut system_info);
            system_info.dwPageSize as usize
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        // Default to 4KB for unknown platforms
        4096
    }
}
