//! IRQ-masking lock for single-core kernel data
//!
//! Mutual exclusion in this kernel is by interrupt masking, not by spinning:
//! there is exactly one core, kernel paths are never reentered while IRQs
//! are masked, and preemption happens only on the timer IRQ. `IrqLock`
//! saves DAIF, masks IRQs for the critical section and restores the saved
//! state when the guard drops.
//!
//! ## Guards across context switches
//!
//! A guard may legitimately remain live across `swap`: the suspended
//! process keeps its guard on its own kernel stack and finishes its
//! critical section when it is next scheduled. The first dispatch of a new
//! process leaves through `trap_return`, where ERET re-enables IRQs from
//! the saved SPSR. There is no lock bit to leak, so neither path needs a
//! release hook.

use ::core::cell::UnsafeCell;
use ::core::ops::{Deref, DerefMut};

use super::cpu;

/// An IRQ-masking lock
pub struct IrqLock<T> {
    data: UnsafeCell<T>,
}

// Safety: single-core mutual exclusion by IRQ masking; see module docs.
unsafe impl<T: Send> Send for IrqLock<T> {}
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    /// Create a new lock
    pub const fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
        }
    }

    /// Enter the critical section, masking IRQs
    ///
    /// Returns a guard that restores the previous interrupt state on drop.
    /// Nesting is fine: the inner guard restores a masked state.
    #[inline]
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let irq_state = cpu::save_and_disable_irq();
        IrqLockGuard {
            lock: self,
            irq_state,
        }
    }
}

/// RAII guard for IrqLock
///
/// When dropped, restores the interrupt state to what it was before the
/// lock was acquired.
pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    irq_state: u64, // Saved DAIF register value
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: IRQs are masked and there is one core
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: IRQs are masked and there is one core
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        cpu::restore_irq(self.irq_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_gives_exclusive_access() {
        let lock = IrqLock::new(5u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn nested_locks_compose() {
        let a = IrqLock::new(1u32);
        let b = IrqLock::new(2u32);
        let ga = a.lock();
        let gb = b.lock();
        assert_eq!(*ga + *gb, 3);
    }
}
