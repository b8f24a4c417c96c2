//! User address spaces
//!
//! Every process owns a four-level translation table mapping exactly one
//! 2 MiB page at `USERSPACE_BASE`: text, data and stack of a program all
//! live in that page. Table pages and the user page itself come from the
//! physical pool; `free_uvm` walks the table and returns everything.
//!
//! Descriptors hold physical addresses; the kernel edits tables through
//! the identity mapping (`to_virt`).

use crate::arch::mmu::{
    self, PAGE_TABLE_ENTRIES, TABLE_FLAGS, USER_PAGE_FLAGS, entry_valid, make_entry,
};
use crate::error::{KernelError, KernelResult};
use crate::fs::fat16::Fat16Volume;
use crate::mm::phys::PAGE_POOL;
use crate::mm::{PAGE_SIZE, USERSPACE_BASE, to_phys, to_virt};

/// View a table page as a descriptor array
///
/// # Safety
/// `table_va` must be a live table page owned by the caller's map.
unsafe fn table(table_va: u64) -> &'static mut [u64; PAGE_TABLE_ENTRIES] {
    unsafe { &mut *(table_va as *mut [u64; PAGE_TABLE_ENTRIES]) }
}

/// Map one user 2 MiB page at `va`, allocating intermediate tables
///
/// `page_va` is the kernel virtual address of the data page.
fn map_user_page(root_va: u64, va: u64, page_va: u64) -> KernelResult<()> {
    let l0 = unsafe { table(root_va) };
    let l0e = &mut l0[mmu::l0_index(va)];
    if !entry_valid(*l0e) {
        let t = PAGE_POOL
            .lock()
            .alloc_zeroed()
            .ok_or(KernelError::OutOfMemory)?;
        *l0e = make_entry(to_phys(t), TABLE_FLAGS);
    }

    let l1 = unsafe { table(to_virt(mmu::table_addr(*l0e))) };
    let l1e = &mut l1[mmu::l1_index(va)];
    if !entry_valid(*l1e) {
        let t = PAGE_POOL
            .lock()
            .alloc_zeroed()
            .ok_or(KernelError::OutOfMemory)?;
        *l1e = make_entry(to_phys(t), TABLE_FLAGS);
    }

    let l2 = unsafe { table(to_virt(mmu::table_addr(*l1e))) };
    let l2e = &mut l2[mmu::l2_index(va)];
    debug_assert!(!entry_valid(*l2e), "user page mapped twice");
    *l2e = make_entry(to_phys(page_va), USER_PAGE_FLAGS);
    Ok(())
}

/// Kernel virtual address of the user page mapped in `root_va`, if any
fn user_page(root_va: u64) -> Option<u64> {
    let va = USERSPACE_BASE;
    let l0e = unsafe { table(root_va) }[mmu::l0_index(va)];
    if !entry_valid(l0e) {
        return None;
    }
    let l1e = unsafe { table(to_virt(mmu::table_addr(l0e))) }[mmu::l1_index(va)];
    if !entry_valid(l1e) {
        return None;
    }
    let l2e = unsafe { table(to_virt(mmu::table_addr(l1e))) }[mmu::l2_index(va)];
    if !entry_valid(l2e) {
        return None;
    }
    Some(to_virt(mmu::block_addr(l2e)))
}

/// Build the user address space for a fresh process
///
/// Allocates the single user page, maps it at `USERSPACE_BASE` and loads
/// the named program's raw image into it through the kernel alias (the
/// target map need not be installed).
pub fn setup_uvm(vol: &Fat16Volume, root_va: u64, path: &[u8]) -> KernelResult<()> {
    let page = PAGE_POOL
        .lock()
        .alloc_zeroed()
        .ok_or(KernelError::OutOfMemory)?;
    if let Err(e) = map_user_page(root_va, USERSPACE_BASE, page) {
        unsafe { PAGE_POOL.lock().free(page) };
        return Err(e);
    }
    let dst = unsafe { core::slice::from_raw_parts_mut(page as *mut u8, PAGE_SIZE) };
    // The page stays mapped on failure; free_uvm reclaims it with the rest
    vol.load_file(path, dst)?;
    Ok(())
}

/// Clone the user page of `src_root` into `dst_root`
///
/// `size` bytes are copied (the source system always passes the full page).
pub fn copy_uvm(dst_root: u64, src_root: u64, size: usize) -> KernelResult<()> {
    let src = user_page(src_root).ok_or(KernelError::BadAddress)?;
    let page = PAGE_POOL
        .lock()
        .alloc_zeroed()
        .ok_or(KernelError::OutOfMemory)?;
    unsafe {
        core::ptr::copy_nonoverlapping(src as *const u8, page as *mut u8, size.min(PAGE_SIZE));
    }
    if let Err(e) = map_user_page(dst_root, USERSPACE_BASE, page) {
        unsafe { PAGE_POOL.lock().free(page) };
        return Err(e);
    }
    Ok(())
}

/// Tear down a user address space
///
/// Frees every user data page, every intermediate table and the root.
pub fn free_uvm(root_va: u64) {
    let mut pool = PAGE_POOL.lock();
    let l0 = unsafe { table(root_va) };
    for l0e in l0.iter() {
        if !entry_valid(*l0e) {
            continue;
        }
        let l1_va = to_virt(mmu::table_addr(*l0e));
        let l1 = unsafe { table(l1_va) };
        for l1e in l1.iter() {
            if !entry_valid(*l1e) {
                continue;
            }
            let l2_va = to_virt(mmu::table_addr(*l1e));
            let l2 = unsafe { table(l2_va) };
            for l2e in l2.iter() {
                if entry_valid(*l2e) {
                    unsafe { pool.free(to_virt(mmu::block_addr(*l2e))) };
                }
            }
            unsafe { pool.free(l2_va) };
        }
        unsafe { pool.free(l1_va) };
    }
    unsafe { pool.free(root_va) };
}

/// Install a process's address space
pub fn switch_vm(root_va: u64) {
    mmu::install_ttbr0(to_phys(root_va));
}
