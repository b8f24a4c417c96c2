//! Memory management
//!
//! One page size everywhere: 2 MiB. The physical pool hands out 2 MiB
//! frames (kernel stacks, translation tables, user pages alike) and
//! `vm` builds the per-process user address spaces from them.

pub mod phys;
pub mod vm;

/// Kernel base virtual address; all of physical memory is identity-mapped
/// here by the boot glue.
pub const KERNEL_BASE: u64 = 0xffff_0000_0000_0000;

/// Userspace base virtual address - program entry and load address
pub const USERSPACE_BASE: u64 = 0x0000_0000_0040_0000;

/// Page size: 2 MiB granule throughout
pub const PAGE_SIZE: usize = 0x20_0000;

/// Kernel stack size - one page per process
pub const STACK_SIZE: usize = PAGE_SIZE;

/// End of the managed physical region (kernel virtual address)
pub const MEMORY_END: u64 = KERNEL_BASE + 0x3000_0000;

/// The boot glue loads the raw FAT16 disk image immediately after the
/// managed region.
pub const FS_BASE: u64 = MEMORY_END;

/// Kernel virtual address of a physical address
#[inline]
pub const fn to_virt(pa: u64) -> u64 {
    pa + KERNEL_BASE
}

/// Physical address of a kernel virtual address
#[inline]
pub const fn to_phys(va: u64) -> u64 {
    va - KERNEL_BASE
}

/// Round up to the next page boundary
#[inline]
pub const fn page_align_up(addr: u64) -> u64 {
    (addr + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1)
}
