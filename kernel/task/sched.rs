//! Scheduler
//!
//! Preemptive, single-core, non-priority round-robin over the ready queue.
//! The idle process is never enqueued; it runs exactly when the ready
//! queue is empty. A candidate must clear its pending signals at the head
//! of the queue before it is granted the CPU - if a default handler kills
//! it there, selection simply retries with the new head.

use crate::arch::context::swap;
use crate::mm::vm;
use crate::printkln;
use crate::signal::{self, SIGTERM};

use super::{IDLE, Kernel, ProcState, event};

/// Select the next process to run
///
/// Pops the first ready candidate that survives its own pending signals.
/// With nothing runnable the idle process is chosen - and if the wait list
/// is empty too while idle carries a system-wide SIGTERM, the shutdown is
/// latched.
pub fn pick_next(k: &mut Kernel) -> usize {
    while let Some(candidate) = k.ready.front() {
        if k.procs[IDLE].signals.contains(SIGTERM) {
            printkln!(
                "Stopping process {} ({})",
                k.procs[candidate].name_str(),
                k.procs[candidate].pid
            );
        }
        signal::check_pending_signals(k, candidate);
        // Still at the head: the candidate survived and gets the CPU
        if k.ready.front() == Some(candidate) {
            k.ready.pop_front(&mut k.procs);
            return candidate;
        }
        // A handler removed it (killed); retry with the new head
    }

    if k.wait_list.is_empty() && k.procs[IDLE].signals.contains(SIGTERM) && !k.shutdown {
        k.shutdown = true;
        printkln!("Shutting down...");
    }
    IDLE
}

/// Switch to the next runnable process
///
/// The chosen process claims the foreground if it wants one and nobody
/// holds it. Control returns here when the calling process is next
/// scheduled (or never, if it exited).
pub fn schedule(k: &mut Kernel) {
    let old = k.current;
    let next = pick_next(k);

    k.procs[next].state = ProcState::Running;
    k.current = next;
    if !k.procs[next].daemon && k.fg_process().is_none() {
        k.fg = Some(next);
    }

    // Re-picking the running process is a no-op; swapping onto a stale
    // saved stack pointer would corrupt the live stack
    if next == old {
        return;
    }

    vm::switch_vm(k.procs[next].page_map);
    let prev_sp: *mut u64 = &mut k.procs[old].sp;
    let next_sp = k.procs[next].sp;
    unsafe {
        swap(prev_sp, next_sp);
    }
    // Resumed: this process owns the CPU again
}

/// Timer-driven preemption
///
/// A no-op while nothing else is runnable; otherwise the current process
/// goes to the back of the ready queue (idle is never enqueued) and the
/// scheduler runs.
pub fn trigger_scheduler(k: &mut Kernel) {
    if k.ready.is_empty() {
        return;
    }
    let cur = k.current;
    k.procs[cur].state = ProcState::Ready;
    if k.procs[cur].pid != 0 {
        k.ready.push_back(&mut k.procs, cur);
    }
    schedule(k);
}

/// Block the current process on an event
///
/// A genuine wake clears the event to `NONE`; any other resumption (a
/// signal pulled the process off the wait list, a peer consumed the event
/// first) goes straight back to sleep.
pub fn sleep(k: &mut Kernel, ev: i32) {
    let me = k.current;
    loop {
        k.procs[me].state = ProcState::Sleep;
        k.procs[me].event = ev;
        k.wait_list.push_back(&mut k.procs, me);
        schedule(k);
        if k.procs[me].event == event::NONE {
            break;
        }
    }
}

/// Wake every process waiting on an event
///
/// Ready processes that happen to carry the event just have it cleared
/// (they were woken early for other reasons); sleepers move to the ready
/// queue in FIFO order with their event cleared.
pub fn wake_up(k: &mut Kernel, ev: i32) {
    let mut cur = k.ready.front();
    while let Some(i) = cur {
        if k.procs[i].event == ev {
            k.procs[i].event = event::NONE;
        }
        cur = k.ready.next(&k.procs, i);
    }

    loop {
        let mut found = None;
        let mut cur = k.wait_list.front();
        while let Some(i) = cur {
            if k.procs[i].event == ev {
                found = Some(i);
                break;
            }
            cur = k.wait_list.next(&k.procs, i);
        }
        let Some(i) = found else { break };
        k.wait_list.remove(&mut k.procs, i);
        k.procs[i].event = event::NONE;
        k.procs[i].state = ProcState::Ready;
        k.ready.push_back(&mut k.procs, i);
    }
}

/// One 10 ms tick: wake due sleepers, then preempt
pub fn timer_tick(k: &mut Kernel) {
    k.ticks += 1;
    wake_due_sleepers(k);
    trigger_scheduler(k);
}

/// Wake timed sleepers whose deadline has passed
///
/// Only their events are cleared so the sleep loop lets them through;
/// unrelated sleepers are not disturbed.
fn wake_due_sleepers(k: &mut Kernel) {
    loop {
        let mut due = None;
        let mut cur = k.wait_list.front();
        while let Some(i) = cur {
            if k.procs[i].event == event::TIMER_WAIT && k.procs[i].wake_tick <= k.ticks {
                due = Some(i);
                break;
            }
            cur = k.wait_list.next(&k.procs, i);
        }
        let Some(i) = due else { break };
        k.wait_list.remove(&mut k.procs, i);
        k.procs[i].event = event::NONE;
        k.procs[i].state = ProcState::Ready;
        k.ready.push_back(&mut k.procs, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SIGCHLD, SIGINT};
    use crate::task::{PROC_TABLE_SIZE, Process};

    fn spawn(k: &mut Kernel, pid: i32, state: ProcState) -> usize {
        let idx = (1..PROC_TABLE_SIZE)
            .find(|&i| k.procs[i].state == ProcState::Unused)
            .unwrap();
        k.procs[idx] = Process::new();
        k.procs[idx].pid = pid;
        k.procs[idx].ppid = 1;
        k.procs[idx].state = state;
        match state {
            ProcState::Ready => k.ready.push_back(&mut k.procs, idx),
            ProcState::Sleep => k.wait_list.push_back(&mut k.procs, idx),
            _ => {}
        }
        idx
    }

    #[test]
    fn pick_next_is_fifo() {
        let mut k = Kernel::new();
        let a = spawn(&mut k, 2, ProcState::Ready);
        let b = spawn(&mut k, 3, ProcState::Ready);
        assert_eq!(pick_next(&mut k), a);
        assert_eq!(pick_next(&mut k), b);
        assert_eq!(pick_next(&mut k), IDLE);
    }

    #[test]
    fn killed_candidate_is_skipped() {
        let mut k = Kernel::new();
        let doomed = spawn(&mut k, 2, ProcState::Ready);
        k.procs[doomed].signals.add(SIGINT);
        let survivor = spawn(&mut k, 3, ProcState::Ready);

        assert_eq!(pick_next(&mut k), survivor);
        assert_eq!(k.procs[doomed].state, ProcState::Killed);
        assert!(k.zombies.contains(&k.procs, doomed));
    }

    #[test]
    fn benign_signal_does_not_cost_the_cpu() {
        let mut k = Kernel::new();
        let idx = spawn(&mut k, 2, ProcState::Ready);
        k.procs[idx].signals.add(SIGCHLD);
        k.procs[idx].status = 0x0700;

        assert_eq!(pick_next(&mut k), idx);
        // The default SIGCHLD action consumed the stored child status
        assert_eq!(k.procs[idx].status, 0);
        assert!(k.procs[idx].signals.is_empty());
    }

    #[test]
    fn shutdown_latches_only_when_everything_drained() {
        let mut k = Kernel::new();
        k.procs[IDLE].signals.add(crate::signal::SIGTERM);
        let sleeper = spawn(&mut k, 2, ProcState::Sleep);
        k.procs[sleeper].event = event::ZOMBIE_CLEANUP;

        // A sleeper still exists: no shutdown yet
        assert_eq!(pick_next(&mut k), IDLE);
        assert!(!k.shutdown);

        k.wait_list.remove(&mut k.procs, sleeper);
        k.procs[sleeper].state = ProcState::Killed;
        assert_eq!(pick_next(&mut k), IDLE);
        assert!(k.shutdown);
    }

    #[test]
    fn wake_up_moves_matching_sleepers_fifo() {
        let mut k = Kernel::new();
        let a = spawn(&mut k, 2, ProcState::Sleep);
        let b = spawn(&mut k, 3, ProcState::Sleep);
        let c = spawn(&mut k, 4, ProcState::Sleep);
        k.procs[a].event = event::ZOMBIE_CLEANUP;
        k.procs[b].event = event::FG_PAUSED;
        k.procs[c].event = event::ZOMBIE_CLEANUP;

        wake_up(&mut k, event::ZOMBIE_CLEANUP);
        assert_eq!(k.ready.front(), Some(a));
        assert_eq!(k.procs[a].event, event::NONE);
        assert_eq!(k.procs[c].event, event::NONE);
        assert_eq!(k.procs[a].state, ProcState::Ready);
        // The FG_PAUSED sleeper was not disturbed
        assert_eq!(k.procs[b].state, ProcState::Sleep);
        assert!(k.wait_list.contains(&k.procs, b));
    }

    #[test]
    fn wake_up_clears_events_of_ready_processes() {
        let mut k = Kernel::new();
        let idx = spawn(&mut k, 2, ProcState::Ready);
        k.procs[idx].event = event::CONSOLE_RX;
        wake_up(&mut k, event::CONSOLE_RX);
        assert_eq!(k.procs[idx].event, event::NONE);
        assert!(k.ready.contains(&k.procs, idx));
    }

    #[test]
    fn timer_wakes_only_due_sleepers() {
        let mut k = Kernel::new();
        let soon = spawn(&mut k, 2, ProcState::Sleep);
        let later = spawn(&mut k, 3, ProcState::Sleep);
        let unrelated = spawn(&mut k, 4, ProcState::Sleep);
        k.procs[soon].event = event::TIMER_WAIT;
        k.procs[soon].wake_tick = 1;
        k.procs[later].event = event::TIMER_WAIT;
        k.procs[later].wake_tick = 50;
        k.procs[unrelated].event = event::CONSOLE_RX;

        k.ticks = 1;
        wake_due_sleepers(&mut k);
        assert_eq!(k.procs[soon].state, ProcState::Ready);
        assert!(k.ready.contains(&k.procs, soon));
        assert_eq!(k.procs[later].state, ProcState::Sleep);
        assert_eq!(k.procs[unrelated].state, ProcState::Sleep);

        k.ticks = 50;
        wake_due_sleepers(&mut k);
        assert_eq!(k.procs[later].state, ProcState::Ready);
        assert_eq!(k.procs[unrelated].state, ProcState::Sleep);
    }
}
