//! User-pointer access
//!
//! Userspace is a single 2 MiB page and the caller's address space is
//! installed while it runs in the kernel, so user pointers are plain
//! addresses - these helpers only range-check them against the user page
//! before dereferencing.

use crate::error::{KernelError, KernelResult};
use crate::mm::{PAGE_SIZE, USERSPACE_BASE};

/// Is `[addr, addr+len)` inside the user page?
pub fn user_range_ok(addr: u64, len: usize) -> bool {
    addr >= USERSPACE_BASE
        && len <= PAGE_SIZE
        && addr + len as u64 <= USERSPACE_BASE + PAGE_SIZE as u64
}

/// Borrow user memory for reading
///
/// # Safety
/// The caller's user page must be the installed address space.
pub unsafe fn user_slice<'a>(addr: u64, len: usize) -> KernelResult<&'a [u8]> {
    if !user_range_ok(addr, len) {
        return Err(KernelError::BadAddress);
    }
    Ok(unsafe { core::slice::from_raw_parts(addr as *const u8, len) })
}

/// Borrow user memory for writing
///
/// # Safety
/// As `user_slice`.
pub unsafe fn user_slice_mut<'a>(addr: u64, len: usize) -> KernelResult<&'a mut [u8]> {
    if !user_range_ok(addr, len) {
        return Err(KernelError::BadAddress);
    }
    Ok(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len) })
}

/// Borrow a NUL-terminated user string (without the NUL)
///
/// Fails if no terminator shows up within `max` bytes or before the end
/// of the user page.
///
/// # Safety
/// As `user_slice`.
pub unsafe fn user_cstr<'a>(addr: u64, max: usize) -> KernelResult<&'a [u8]> {
    if !user_range_ok(addr, 1) {
        return Err(KernelError::BadAddress);
    }
    let page_left = (USERSPACE_BASE + PAGE_SIZE as u64 - addr) as usize;
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, max.min(page_left)) };
    let len = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(KernelError::BadAddress)?;
    Ok(&bytes[..len])
}

/// Read one u64 from user memory (an argv vector slot)
///
/// # Safety
/// As `user_slice`.
pub unsafe fn user_read_u64(addr: u64) -> KernelResult<u64> {
    if !user_range_ok(addr, 8) {
        return Err(KernelError::BadAddress);
    }
    Ok(unsafe { core::ptr::read_unaligned(addr as *const u64) })
}

/// Write one i32 to user memory (a wstatus slot)
///
/// # Safety
/// As `user_slice`.
pub unsafe fn user_write_i32(addr: u64, value: i32) -> KernelResult<()> {
    if !user_range_ok(addr, 4) {
        return Err(KernelError::BadAddress);
    }
    unsafe { core::ptr::write_unaligned(addr as *mut i32, value) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_check_rejects_outside_the_user_page() {
        assert!(user_range_ok(USERSPACE_BASE, 16));
        assert!(user_range_ok(USERSPACE_BASE + PAGE_SIZE as u64 - 4, 4));
        assert!(!user_range_ok(0, 4));
        assert!(!user_range_ok(USERSPACE_BASE - 1, 1));
        assert!(!user_range_ok(USERSPACE_BASE + PAGE_SIZE as u64 - 3, 4));
        assert!(!user_range_ok(USERSPACE_BASE, PAGE_SIZE + 1));
    }
}
