//! Trap frames and context switching (aarch64)
//!
//! The context frame layout is ABI shared with the external trap glue
//! (vectors.S) and the `swap` primitive (switch.S): the glue stores the
//! frame as one contiguous block at the top of the owning process's kernel
//! stack on every exception, and restores it on `trap_return`.
//!
//! Below the frame sits the callee-saved area consumed by `swap`
//! (x19..x30, 12 registers). Seeding slot 11 (x30) of that area with
//! `trap_return` makes the first dispatch of a process leave the kernel
//! through the exception-return path into EL0.

use crate::mm::{PAGE_SIZE, USERSPACE_BASE};

/// Bytes `swap` pushes/pops around a switch: x19..x30
pub const SWITCH_CONTEXT_SIZE: u64 = 12 * 8;

/// Saved register set, stored at the top of the kernel stack
///
/// Layout is ABI with the assembly prologue/epilogue - field order and
/// offsets must not change.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ContextFrame {
    /// General-purpose registers x0-x30
    pub x: [u64; 31],
    /// EL0 stack pointer
    pub sp0: u64,
    /// Exception link register (PC to return to)
    pub elr: u64,
    /// Saved program state (EL0, IRQs unmasked when 0)
    pub spsr: u64,
    /// Trap number recorded by the vector glue
    pub trapno: u64,
    /// Exception syndrome (ESR_EL1)
    pub esr: u64,
}

impl ContextFrame {
    /// An all-zero frame: EL0 target with interrupts enabled
    pub const fn zeroed() -> Self {
        Self {
            x: [0; 31],
            sp0: 0,
            elr: 0,
            spsr: 0,
            trapno: 0,
            esr: 0,
        }
    }

    /// Point the frame at a fresh program image
    ///
    /// Entry at the userspace base, EL0 stack at the top of the single
    /// user page, EL0 mode with IRQs unmasked.
    pub fn reset_for_user(&mut self) {
        *self = Self::zeroed();
        self.elr = USERSPACE_BASE;
        self.sp0 = USERSPACE_BASE + PAGE_SIZE as u64;
        self.spsr = 0;
    }
}

/// Address of a process's context frame given its kernel stack page
#[inline]
pub fn frame_addr(kstack: u64) -> u64 {
    kstack + PAGE_SIZE as u64 - core::mem::size_of::<ContextFrame>() as u64
}

// The context-switch primitive and the trap-return path live in the
// external assembly glue.
#[cfg(target_arch = "aarch64")]
unsafe extern "C" {
    /// Save callee-saved state on the current kernel stack, store the
    /// resulting stack pointer through `prev_sp`, switch to `next_sp`
    /// and resume whatever was saved there.
    pub fn swap(prev_sp: *mut u64, next_sp: u64);

    fn trap_return() -> !;
}

/// Host builds (unit tests) never switch contexts
///
/// # Safety
/// Present only so cross-cutting code links on the host; must not be called.
#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn swap(_prev_sp: *mut u64, _next_sp: u64) {
    unreachable!("context switch on host");
}

/// Address of the trap-return path, for seeding new kernel stacks
#[cfg(target_arch = "aarch64")]
pub fn trap_return_addr() -> u64 {
    trap_return as *const () as u64
}

/// Host builds seed a dummy return address
#[cfg(not(target_arch = "aarch64"))]
pub fn trap_return_addr() -> u64 {
    0xdead_0000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_is_abi() {
        // 31 GPRs + sp0 + elr + spsr + trapno + esr
        assert_eq!(core::mem::size_of::<ContextFrame>(), 36 * 8);
        assert_eq!(core::mem::offset_of!(ContextFrame, sp0), 31 * 8);
        assert_eq!(core::mem::offset_of!(ContextFrame, elr), 32 * 8);
        assert_eq!(core::mem::offset_of!(ContextFrame, spsr), 33 * 8);
    }

    #[test]
    fn reset_targets_user_entry() {
        let mut frame = ContextFrame::zeroed();
        frame.x[5] = 77;
        frame.reset_for_user();
        assert_eq!(frame.x[5], 0);
        assert_eq!(frame.elr, USERSPACE_BASE);
        assert_eq!(frame.sp0, USERSPACE_BASE + PAGE_SIZE as u64);
        assert_eq!(frame.spsr, 0);
    }
}
