//! In-core inodes and the open-file model
//!
//! Three layers of indirection, all index-based:
//!
//! - per-process fd table: fd -> global file-table slot
//! - global file table: slot -> in-core inode slot, shared after fork
//! - in-core inode table: cached directory-entry metadata, keyed by the
//!   root-directory index of the file
//!
//! Reference counts tie the layers together: a file entry counts the fd
//! slots pointing at it across all processes, an inode counts the file
//! entries pointing at it. Releasing an fd unwinds both, freeing each slot
//! when its count reaches zero.

use crate::error::{KernelError, KernelResult};
use crate::fs::fat16::{Fat16Volume, MAX_EXTNAME_BYTES, MAX_FILENAME_BYTES};

/// Per-process fd table size
pub const MAX_OPEN_FILES: usize = 16;

/// Global open-file table size
pub const FILE_TABLE_SIZE: usize = 64;

/// In-core inode slots - one per possible root-directory entry
pub const INODE_TABLE_SIZE: usize = 512;

/// Per-process file-descriptor table: indexes into the global file table
pub type FdTable = [Option<u16>; MAX_OPEN_FILES];

/// Cached directory-entry metadata
///
/// `ref_count == 0` means the slot is free; the cached fields are only
/// meaningful while referenced.
#[derive(Clone, Copy)]
pub struct Inode {
    /// Root-directory index this inode caches
    pub dir_index: u32,
    /// File size in bytes
    pub file_size: u32,
    /// First cluster of the data chain
    pub first_cluster: u16,
    /// 8.3 name, space padded
    pub name: [u8; MAX_FILENAME_BYTES],
    /// Extension, space padded
    pub ext: [u8; MAX_EXTNAME_BYTES],
    /// Number of file entries pointing here
    pub ref_count: u32,
}

impl Inode {
    const fn new() -> Self {
        Self {
            dir_index: 0,
            file_size: 0,
            first_cluster: 0,
            name: [0; MAX_FILENAME_BYTES],
            ext: [0; MAX_EXTNAME_BYTES],
            ref_count: 0,
        }
    }
}

/// The in-core inode table, keyed by root-directory index
pub struct InodeTable {
    slots: [Inode; INODE_TABLE_SIZE],
}

impl InodeTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { Inode::new() }; INODE_TABLE_SIZE],
        }
    }

    /// Get (and reference) the inode for a directory entry
    ///
    /// A free slot is populated from the directory entry first; either way
    /// the reference count is incremented.
    pub fn get(&mut self, vol: &Fat16Volume, dir_index: u32) -> KernelResult<u16> {
        let idx = dir_index as usize;
        if idx >= INODE_TABLE_SIZE {
            return Err(KernelError::InvalidArgument);
        }
        if self.slots[idx].ref_count == 0 {
            let entry = vol.dir_entry(idx);
            self.slots[idx] = Inode {
                dir_index,
                file_size: entry.file_size,
                first_cluster: entry.cluster_index,
                name: entry.name,
                ext: entry.ext,
                ref_count: 0,
            };
        }
        self.slots[idx].ref_count += 1;
        Ok(dir_index as u16)
    }

    /// Drop one reference to an inode
    ///
    /// Releasing an unreferenced inode is an invariant violation.
    pub fn put(&mut self, inode: u16) {
        let slot = &mut self.slots[inode as usize];
        assert!(slot.ref_count > 0, "inode_put with no references");
        slot.ref_count -= 1;
    }

    /// Read an inode slot
    pub fn slot(&self, inode: u16) -> &Inode {
        &self.slots[inode as usize]
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Global open-file entry, shared between fd tables after fork
///
/// `inode == None` means the slot is free.
#[derive(Clone, Copy)]
pub struct FileEntry {
    /// In-core inode this open file refers to
    pub inode: Option<u16>,
    /// Number of fd-table slots (across all processes) pointing here
    pub ref_count: u32,
    /// Open mode; this filesystem is read-only, so always 0
    pub mode: u32,
}

impl FileEntry {
    const fn new() -> Self {
        Self {
            inode: None,
            ref_count: 0,
            mode: 0,
        }
    }
}

/// The global open-file table
pub struct FileTable {
    slots: [FileEntry; FILE_TABLE_SIZE],
}

impl FileTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { FileEntry::new() }; FILE_TABLE_SIZE],
        }
    }

    fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|e| e.inode.is_none())
    }

    /// Read a file entry
    pub fn slot(&self, index: u16) -> &FileEntry {
        &self.slots[index as usize]
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a file for a process
///
/// Wires fd slot -> file entry -> inode, taking one reference at each
/// level. Fails on fd exhaustion, file-table exhaustion or a missing path.
pub fn open_file(
    inodes: &mut InodeTable,
    files: &mut FileTable,
    fdt: &mut FdTable,
    vol: &Fat16Volume,
    path: &[u8],
) -> KernelResult<usize> {
    let fd = fdt
        .iter()
        .position(|slot| slot.is_none())
        .ok_or(KernelError::ProcessFileLimit)?;
    let entry = files.find_free().ok_or(KernelError::SystemFileLimit)?;
    let dir_index = vol.search(path).ok_or(KernelError::NotFound)?;
    let inode = inodes.get(vol, dir_index)?;

    files.slots[entry] = FileEntry {
        inode: Some(inode),
        ref_count: 1,
        mode: 0,
    };
    fdt[fd] = Some(entry as u16);
    Ok(fd)
}

/// Close one file descriptor
///
/// Negative and unused descriptors are silent no-ops. The caller's fd slot
/// is always cleared; the file entry (and transitively the inode slot) is
/// freed when its last reference drops.
pub fn close_file(inodes: &mut InodeTable, files: &mut FileTable, fdt: &mut FdTable, fd: i32) {
    if fd < 0 || fd as usize >= MAX_OPEN_FILES {
        return;
    }
    let Some(entry_idx) = fdt[fd as usize] else {
        return;
    };
    let entry = &mut files.slots[entry_idx as usize];
    if let Some(inode) = entry.inode {
        inodes.put(inode);
    }
    entry.ref_count -= 1;
    if entry.ref_count == 0 {
        entry.inode = None;
    }
    fdt[fd as usize] = None;
}

/// Duplicate an fd table for a forked child
///
/// Every live slot gains one file-entry reference and one inode reference.
pub fn clone_fd_table(inodes: &mut InodeTable, files: &mut FileTable, src: &FdTable) -> FdTable {
    let mut dst: FdTable = [None; MAX_OPEN_FILES];
    for (i, slot) in src.iter().enumerate() {
        if let Some(entry_idx) = slot {
            let entry = &mut files.slots[*entry_idx as usize];
            entry.ref_count += 1;
            if let Some(inode) = entry.inode {
                inodes.slots[inode as usize].ref_count += 1;
            }
            dst[i] = Some(*entry_idx);
        }
    }
    dst
}

/// Release every descriptor a process still holds
///
/// Used when a zombie is reaped: each held reference is dropped exactly
/// once and the fd table is cleared.
pub fn release_fd_table(inodes: &mut InodeTable, files: &mut FileTable, fdt: &mut FdTable) {
    for fd in 0..MAX_OPEN_FILES {
        close_file(inodes, files, fdt, fd as i32);
    }
}

/// File size behind a descriptor
pub fn file_size(
    inodes: &InodeTable,
    files: &FileTable,
    fdt: &FdTable,
    fd: i32,
) -> KernelResult<u32> {
    let inode = fd_inode(files, fdt, fd)?;
    Ok(inodes.slot(inode).file_size)
}

/// First data cluster behind a descriptor
pub fn fd_first_cluster(
    inodes: &InodeTable,
    files: &FileTable,
    fdt: &FdTable,
    fd: i32,
) -> KernelResult<u16> {
    let inode = fd_inode(files, fdt, fd)?;
    Ok(inodes.slot(inode).first_cluster)
}

fn fd_inode(files: &FileTable, fdt: &FdTable, fd: i32) -> KernelResult<u16> {
    if fd < 0 || fd as usize >= MAX_OPEN_FILES {
        return Err(KernelError::BadFd);
    }
    let entry_idx = fdt[fd as usize].ok_or(KernelError::BadFd)?;
    files.slot(entry_idx).inode.ok_or(KernelError::BadFd)
}
