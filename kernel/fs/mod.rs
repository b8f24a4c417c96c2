//! File system
//!
//! Read-only FAT16 over the memory-resident disk image, plus the in-core
//! open-file model (inode cache, global file table, per-process fd tables).

pub mod fat16;
pub mod inode;

use spin::Once;

use fat16::Fat16Volume;

/// The mounted volume, located once at boot
static VOLUME: Once<Fat16Volume> = Once::new();

/// Locate and validate the FAT16 volume inside the boot-loaded disk image
///
/// Panics on a bad boot signature - a system without its root volume
/// cannot start userspace.
pub fn init() {
    let vol = unsafe { Fat16Volume::locate(crate::mm::FS_BASE as *const u8) }
        .expect("invalid FAT16 signature");
    crate::printkln!(
        "fs: FAT16 volume, {} root entries, {} byte clusters",
        vol.root_entry_count(),
        vol.cluster_size()
    );
    VOLUME.call_once(|| vol);
}

/// The mounted volume
///
/// Panics if called before `init` - file operations before mount are a bug.
pub fn volume() -> &'static Fat16Volume {
    VOLUME.get().expect("fs not initialized")
}
