//! Architecture support
//!
//! kestrel targets aarch64 only; this module keeps the arch surface
//! behind one import path.

pub mod aarch64;

pub use aarch64::{context, cpu, mmu};

pub use aarch64::irqlock::{IrqLock, IrqLockGuard};
