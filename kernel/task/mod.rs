//! Process management
//!
//! The process table, its queues and every piece of process-wide mutable
//! state live in one `Kernel` value behind one IRQ-masking lock. Slot 0 is
//! the idle process (pid 0), which runs only when the ready queue is empty
//! and is never enqueued.

pub mod proc;
pub mod queue;
pub mod sched;

use crate::arch::context::{ContextFrame, frame_addr};
use crate::arch::IrqLock;
use crate::fs::inode::{FdTable, FileTable, InodeTable, MAX_OPEN_FILES};
use crate::signal::{SigHandler, SigSet, TOTAL_SIGNALS};
use self::queue::{Linked, Links, Queue, QueueId};

/// Process-table size; slot 0 is reserved for the idle process
pub const PROC_TABLE_SIZE: usize = 16;

/// Slot index of the idle process
pub const IDLE: usize = 0;

/// Stored process name bytes (8.3 stem, NUL padded)
pub const MAX_PROC_NAME: usize = 16;

/// Wait options for the wait syscall
pub mod wait_options {
    /// Return immediately if no matching zombie exists
    pub const WNOHANG: i32 = 1;
}

/// Sleep/wake event tags
///
/// Positive events are zombie pids (set by exit for wait to match);
/// negative events are kernel rendezvous points. `NONE` marks a genuine
/// wake - `sleep` re-sleeps until its event is cleared.
pub mod event {
    /// No pending event; the sleeper may proceed
    pub const NONE: i32 = 0;
    /// A zombie is available to reap
    pub const ZOMBIE_CLEANUP: i32 = -1;
    /// Waiting for the foreground slot to free up
    pub const FG_PAUSED: i32 = -2;
    /// Timed sleep; the deadline lives in `Process::wake_tick`
    pub const TIMER_WAIT: i32 = -3;
    /// Waiting for console input
    pub const CONSOLE_RX: i32 = -4;
}

/// Process lifecycle states
///
/// The numeric values are ABI: `get_proc_data` exports them to ps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ProcState {
    /// Free slot
    Unused = 0,
    /// Being set up, not yet runnable
    Init = 1,
    /// On the ready queue
    Ready = 2,
    /// Owns the CPU
    Running = 3,
    /// On the wait list
    Sleep = 4,
    /// Zombie awaiting reap
    Killed = 5,
}

/// A process-table slot
pub struct Process {
    /// Lifecycle state, consistent with queue membership
    pub state: ProcState,
    /// Process id; unique across live slots
    pub pid: i32,
    /// Parent pid (a value, not a pointer - children are found by scan)
    pub ppid: i32,
    /// Program name without extension, NUL padded
    pub name: [u8; MAX_PROC_NAME],
    /// Never claims the foreground slot
    pub daemon: bool,
    /// Kernel stack page (kernel VA), 0 when the slot owns none
    pub kstack: u64,
    /// Translation-table root (kernel VA)
    pub page_map: u64,
    /// Saved kernel stack pointer for the context switch
    pub sp: u64,
    /// Event this process sleeps on / advertises as a zombie
    pub event: i32,
    /// pid argument of an in-progress wait
    pub wpid: i32,
    /// Exit status word; on a parent, the last child status delivered
    pub status: i32,
    /// Tick deadline for a timed sleep
    pub wake_tick: u64,
    /// Pending signal bitset
    pub signals: SigSet,
    /// Per-signal handler table
    pub handlers: [SigHandler; TOTAL_SIGNALS],
    /// File-descriptor table
    pub fd_table: FdTable,
    /// Queue linkage
    pub links: Links,
}

impl Process {
    pub const fn new() -> Self {
        Self {
            state: ProcState::Unused,
            pid: 0,
            ppid: 0,
            name: [0; MAX_PROC_NAME],
            daemon: false,
            kstack: 0,
            page_map: 0,
            sp: 0,
            event: event::NONE,
            wpid: 0,
            status: 0,
            wake_tick: 0,
            signals: SigSet::new(),
            handlers: [SigHandler::Default; TOTAL_SIGNALS],
            fd_table: [None; MAX_OPEN_FILES],
            links: Links::new(),
        }
    }

    /// The context frame at the top of this process's kernel stack
    pub fn frame(&self) -> *mut ContextFrame {
        debug_assert!(self.kstack != 0, "frame of a process with no stack");
        frame_addr(self.kstack) as *mut ContextFrame
    }

    /// Name as a str (up to the first NUL)
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_PROC_NAME);
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }

    /// Set the name, truncating to what fits
    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0; MAX_PROC_NAME];
        let len = name.len().min(MAX_PROC_NAME - 1);
        self.name[..len].copy_from_slice(&name[..len]);
    }

    /// Is this slot a live process?
    pub fn in_use(&self) -> bool {
        self.state != ProcState::Unused
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

impl Linked for Process {
    fn links(&self) -> &Links {
        &self.links
    }
    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }
}

/// All process-wide mutable state
///
/// Threaded by &mut through every syscall handler; guarded globally by the
/// IRQ-mask discipline (see `arch::irqlock`).
pub struct Kernel {
    /// The process table
    pub procs: [Process; PROC_TABLE_SIZE],
    /// Runnable processes, round-robin order
    pub ready: Queue,
    /// Sleeping processes
    pub wait_list: Queue,
    /// Exited processes awaiting reap
    pub zombies: Queue,
    /// Slot index of the running process
    pub current: usize,
    /// Slot index of the foreground process, if any
    pub fg: Option<usize>,
    /// Next pid to hand out; reset to 2 on system-wide hangup
    pub pid_num: i32,
    /// Latched by the scheduler once a system-wide SIGTERM has drained
    /// both queues
    pub shutdown: bool,
    /// 10 ms ticks since boot
    pub ticks: u64,
    /// In-core inode cache
    pub inodes: InodeTable,
    /// Global open-file table
    pub files: FileTable,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            procs: [const { Process::new() }; PROC_TABLE_SIZE],
            ready: Queue::new(QueueId::Ready),
            wait_list: Queue::new(QueueId::Wait),
            zombies: Queue::new(QueueId::Zombie),
            current: IDLE,
            fg: None,
            pid_num: 1,
            shutdown: false,
            ticks: 0,
            inodes: InodeTable::new(),
            files: FileTable::new(),
        }
    }

    /// Find a live process by pid
    pub fn get_process(&self, pid: i32) -> Option<usize> {
        (1..PROC_TABLE_SIZE).find(|&i| self.procs[i].in_use() && self.procs[i].pid == pid)
    }

    /// The foreground process, if it is still alive
    pub fn fg_process(&self) -> Option<usize> {
        let idx = self.fg?;
        match self.procs[idx].state {
            ProcState::Unused | ProcState::Killed => None,
            _ => Some(idx),
        }
    }

    /// Detach a slot from whichever queue it is on
    pub fn unlink(&mut self, idx: usize) {
        match self.procs[idx].links.which() {
            Some(QueueId::Ready) => {
                self.ready.remove(&mut self.procs, idx);
            }
            Some(QueueId::Wait) => {
                self.wait_list.remove(&mut self.procs, idx);
            }
            Some(QueueId::Zombie) => {
                self.zombies.remove(&mut self.procs, idx);
            }
            None => {}
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// The kernel state, shared by the syscall and interrupt paths
pub static KERNEL: IrqLock<Kernel> = IrqLock::new(Kernel::new());
