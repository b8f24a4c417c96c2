//! System-call dispatch
//!
//! An EL0 `svc` lands here with the syscall number in x8 and arguments in
//! x0..x5; the result goes back in x0. The ABI surfaces every failure as
//! -1 - the typed kernel errors collapse at this boundary. Unknown numbers
//! are -1 as well.

use crate::arch::context::ContextFrame;
use crate::console;
use crate::error::{KernelError, KernelResult};
use crate::fs;
use crate::fs::inode;
use crate::signal::{SigHandler, valid_signal};
use crate::task::{KERNEL, Kernel, PROC_TABLE_SIZE, event, proc, sched};
use crate::uaccess;

/// Number of syscall table entries (indices 0..16, stable ABI)
pub const TOTAL_SYSCALL_FUNCTIONS: usize = 17;

/// Write to the console UART
pub const SYS_WRITEU: usize = 0;
/// Sleep for N 10 ms ticks
pub const SYS_SLEEP: usize = 1;
/// Open a file by 8.3 path
pub const SYS_OPEN_FILE: usize = 2;
/// Close a file descriptor
pub const SYS_CLOSE_FILE: usize = 3;
/// Size of an open file
pub const SYS_GET_FILE_SIZE: usize = 4;
/// Read an open file from its start
pub const SYS_READ_FILE: usize = 5;
/// Clone the current process
pub const SYS_FORK: usize = 6;
/// Reap a dead child
pub const SYS_WAIT: usize = 7;
/// Replace the current image
pub const SYS_EXEC: usize = 8;
/// Terminate the current process
pub const SYS_EXIT: usize = 9;
/// Blocking console read (foreground only)
pub const SYS_GETCHAR: usize = 10;
/// Pid of the caller
pub const SYS_GETPID: usize = 11;
/// Send a signal
pub const SYS_KILL: usize = 12;
/// Install a one-shot signal handler
pub const SYS_SIGNAL: usize = 13;
/// List live pids
pub const SYS_GET_ACTIVE_PIDS: usize = 14;
/// Per-process data for ps
pub const SYS_GET_PROC_DATA: usize = 15;
/// Raw root-directory entries
pub const SYS_READ_ROOT_DIR: usize = 16;

type SyscallFn = fn(&mut Kernel, &mut ContextFrame) -> KernelResult<i64>;

static SYSCALL_TABLE: [SyscallFn; TOTAL_SYSCALL_FUNCTIONS] = [
    sys_writeu,
    sys_sleep,
    sys_open_file,
    sys_close_file,
    sys_get_file_size,
    sys_read_file,
    sys_fork,
    sys_wait,
    sys_exec,
    sys_exit,
    sys_getchar,
    sys_getpid,
    sys_kill,
    sys_signal,
    sys_get_active_pids,
    sys_get_proc_data,
    sys_read_root_dir,
];

/// Dispatch a trapped system call
pub fn dispatch(frame: &mut ContextFrame) {
    let num = frame.x[8] as usize;
    let ret = if num < TOTAL_SYSCALL_FUNCTIONS {
        let mut k = KERNEL.lock();
        match SYSCALL_TABLE[num](&mut k, frame) {
            Ok(v) => v,
            Err(_) => -1,
        }
    } else {
        -1
    };
    frame.x[0] = ret as u64;
}

fn sys_writeu(_k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let len = frame.x[1] as usize;
    let buf = unsafe { uaccess::user_slice(frame.x[0], len)? };
    console::write_bytes(buf);
    Ok(len as i64)
}

fn sys_sleep(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let me = k.current;
    k.procs[me].wake_tick = k.ticks + frame.x[0];
    sched::sleep(k, event::TIMER_WAIT);
    Ok(0)
}

fn sys_open_file(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let path = unsafe { uaccess::user_cstr(frame.x[0], 16)? };
    let me = k.current;
    let Kernel {
        inodes,
        files,
        procs,
        ..
    } = k;
    let fd = inode::open_file(inodes, files, &mut procs[me].fd_table, fs::volume(), path)?;
    Ok(fd as i64)
}

fn sys_close_file(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let me = k.current;
    let Kernel {
        inodes,
        files,
        procs,
        ..
    } = k;
    inode::close_file(inodes, files, &mut procs[me].fd_table, frame.x[0] as i32);
    Ok(0)
}

fn sys_get_file_size(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let me = k.current;
    let size = inode::file_size(&k.inodes, &k.files, &k.procs[me].fd_table, frame.x[0] as i32)?;
    Ok(size as i64)
}

fn sys_read_file(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let me = k.current;
    let fd = frame.x[0] as i32;
    let size = frame.x[2] as usize;
    let cluster = inode::fd_first_cluster(&k.inodes, &k.files, &k.procs[me].fd_table, fd)?;
    let buf = unsafe { uaccess::user_slice_mut(frame.x[1], size)? };
    Ok(fs::volume().read_chain(cluster, buf) as i64)
}

fn sys_fork(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    proc::fork(k, frame).map(|pid| pid as i64)
}

fn sys_wait(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let wstatus = frame.x[1];
    match proc::wait(k, frame.x[0] as i32, frame.x[2] as i32)? {
        Some((pid, status)) => {
            if wstatus != 0 {
                unsafe { uaccess::user_write_i32(wstatus, status)? };
            }
            Ok(pid as i64)
        }
        None => Ok(0),
    }
}

fn sys_exec(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let path_ptr = frame.x[0];
    let argv_ptr = frame.x[1];
    proc::exec(k, frame, path_ptr, argv_ptr)
}

fn sys_exit(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let me = k.current;
    proc::exit_process(k, me, frame.x[0] as i32, false);
    // exit schedules away and the slot is never dispatched again
    Ok(0)
}

fn sys_getchar(k: &mut Kernel, _frame: &mut ContextFrame) -> KernelResult<i64> {
    // Only the foreground process reads the console
    loop {
        let me = k.current;
        if k.fg_process() == Some(me) {
            break;
        }
        if k.fg_process().is_none() && !k.procs[me].daemon {
            k.fg = Some(me);
            break;
        }
        sched::sleep(k, event::FG_PAUSED);
    }
    loop {
        if let Some(c) = console::try_getc() {
            return Ok(c as i64);
        }
        sched::sleep(k, event::CONSOLE_RX);
    }
}

fn sys_getpid(k: &mut Kernel, _frame: &mut ContextFrame) -> KernelResult<i64> {
    Ok(k.procs[k.current].pid as i64)
}

fn sys_kill(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    proc::kill(k, frame.x[0] as i32, frame.x[1] as i32)
}

fn sys_signal(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let sig = frame.x[0] as i32;
    if !valid_signal(sig) {
        return Err(KernelError::InvalidArgument);
    }
    let me = k.current;
    k.procs[me].handlers[sig as usize] = match frame.x[1] {
        0 => SigHandler::Default,
        addr => SigHandler::User(addr),
    };
    Ok(0)
}

fn sys_get_active_pids(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    if frame.x[0] == 0 {
        return Ok(proc::get_active_pids(k, None) as i64);
    }
    let mut list = [0i32; PROC_TABLE_SIZE];
    let count = proc::get_active_pids(k, Some(&mut list));
    for (i, pid) in list.iter().enumerate().take(count) {
        unsafe { uaccess::user_write_i32(frame.x[0] + i as u64 * 4, *pid)? };
    }
    Ok(count as i64)
}

fn sys_get_proc_data(k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let mut ppid = 0i32;
    let mut state = 0i32;
    let mut name = [0u8; crate::task::MAX_PROC_NAME];
    let mut args = [0u8; 512];
    let size = proc::get_proc_data(
        k,
        frame.x[0] as i32,
        Some(&mut ppid),
        Some(&mut state),
        Some(&mut name),
        Some(&mut args),
    );

    if frame.x[1] != 0 {
        unsafe { uaccess::user_write_i32(frame.x[1], ppid)? };
    }
    if frame.x[2] != 0 {
        unsafe { uaccess::user_write_i32(frame.x[2], state)? };
    }
    if frame.x[3] != 0 {
        let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let out = unsafe { uaccess::user_slice_mut(frame.x[3], len)? };
        out.copy_from_slice(&name[..len]);
    }
    if frame.x[4] != 0 && size > 0 {
        let out = unsafe { uaccess::user_slice_mut(frame.x[4], size)? };
        out.copy_from_slice(&args[..size]);
    }
    Ok(size as i64)
}

fn sys_read_root_dir(_k: &mut Kernel, frame: &mut ContextFrame) -> KernelResult<i64> {
    let vol = fs::volume();
    let bytes = vol.root_dir_bytes();
    let out = unsafe { uaccess::user_slice_mut(frame.x[0], bytes.len())? };
    out.copy_from_slice(bytes);
    Ok(vol.root_entry_count() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_the_abi() {
        assert_eq!(SYSCALL_TABLE.len(), TOTAL_SYSCALL_FUNCTIONS);
        assert_eq!(SYS_READ_ROOT_DIR + 1, TOTAL_SYSCALL_FUNCTIONS);
    }

    #[test]
    fn unknown_numbers_return_minus_one() {
        let mut frame = ContextFrame::zeroed();
        frame.x[8] = TOTAL_SYSCALL_FUNCTIONS as u64;
        dispatch(&mut frame);
        assert_eq!(frame.x[0] as i64, -1);
    }
}
