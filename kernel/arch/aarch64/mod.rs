//! AArch64 architecture support

pub mod context;
pub mod cpu;
pub mod exceptions;
pub mod irqlock;
pub mod mmu;
