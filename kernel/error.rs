//! Unified kernel error type
//!
//! KernelError uses `#[repr(i32)]` with discriminants equal to errno values,
//! trimmed to the conditions this kernel can actually produce.
//!
//! The user-facing syscall ABI of this system encodes every failure as -1
//! (the user library only tests for -1), so the dispatcher collapses
//! `Err(_)` at the boundary; the typed error is for kernel-internal use
//! and diagnostics.

/// Kernel error type with errno values as discriminants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KernelError {
    /// No such file or directory (ENOENT)
    NotFound = 2,
    /// No such process (ESRCH)
    NoProcess = 3,
    /// Bad file descriptor (EBADF)
    BadFd = 9,
    /// No child processes (ECHILD)
    NoChild = 10,
    /// Cannot allocate memory (ENOMEM) - page pool or table slot exhausted
    OutOfMemory = 12,
    /// Bad address (EFAULT) - user pointer outside the user page
    BadAddress = 14,
    /// Invalid argument (EINVAL)
    InvalidArgument = 22,
    /// Too many open files in system (ENFILE) - global file table full
    SystemFileLimit = 23,
    /// Too many open files (EMFILE) - per-process fd table full
    ProcessFileLimit = 24,
}

impl KernelError {
    /// Get the positive errno value
    #[inline]
    pub const fn errno(self) -> i32 {
        self as i32
    }

    /// Return negative errno (for diagnostics; the syscall ABI uses -1)
    #[inline]
    pub const fn sysret(self) -> i64 {
        -(self as i32 as i64)
    }
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
