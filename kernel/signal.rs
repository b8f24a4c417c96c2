//! Signal infrastructure
//!
//! A fixed signal set with per-process pending bitsets and handler tables.
//! Delivery happens in the scheduler: a candidate must clear its pending
//! signals before it is granted the CPU, so a default handler that kills it
//! simply makes the scheduler try the next candidate.
//!
//! User handlers run in EL0. The kernel rewrites the trap frame so the
//! handler is entered with the signal number in x0 and the interrupted PC
//! in x30; the handler's `ret` is the sigreturn. A handler entry resets to
//! default after one delivery - the user library re-arms it.

use crate::task::{Kernel, ProcState, proc};

/// Hangup - terminates everything but init
pub const SIGHUP: u32 = 1;
/// Keyboard interrupt (Ctrl+C on the console)
pub const SIGINT: u32 = 2;
/// Kill
pub const SIGKILL: u32 = 9;
/// Termination; system-wide broadcast means shutdown
pub const SIGTERM: u32 = 15;
/// Child stopped or terminated
pub const SIGCHLD: u32 = 17;

/// Size of the signal number space (bit = signum in the pending set)
pub const TOTAL_SIGNALS: usize = 32;

/// Is this a deliverable signal number?
pub const fn valid_signal(sig: i32) -> bool {
    sig >= 0 && (sig as usize) < TOTAL_SIGNALS
}

/// Pending-signal bitset; bit N is signal N
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct SigSet(pub u32);

impl SigSet {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn contains(&self, sig: u32) -> bool {
        sig < TOTAL_SIGNALS as u32 && self.0 & (1 << sig) != 0
    }

    pub fn add(&mut self, sig: u32) {
        if sig < TOTAL_SIGNALS as u32 {
            self.0 |= 1 << sig;
        }
    }

    pub fn remove(&mut self, sig: u32) {
        if sig < TOTAL_SIGNALS as u32 {
            self.0 &= !(1 << sig);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest pending signal number, if any
    pub fn first(&self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros())
        }
    }
}

/// Signal disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigHandler {
    /// Kernel default action
    #[default]
    Default,
    /// User handler at this EL0 address
    User(u64),
}

/// Reset a process's handler table to defaults
///
/// Called for fresh processes and by exec (a new image inherits nothing).
pub fn init_handlers(p: &mut crate::task::Process) {
    p.handlers = [SigHandler::Default; TOTAL_SIGNALS];
}

/// Mark a signal pending and make a sleeping target runnable
///
/// A sleeper is pulled off the wait list so it observes the signal at its
/// next scheduling; its event is left set, so an uninterested sleeper goes
/// back to sleep.
pub fn send_signal(k: &mut Kernel, idx: usize, sig: u32) {
    k.procs[idx].signals.add(sig);
    if k.procs[idx].state == ProcState::Sleep {
        k.wait_list.remove(&mut k.procs, idx);
        k.procs[idx].state = ProcState::Ready;
        k.ready.push_back(&mut k.procs, idx);
    }
}

/// Deliver every pending signal to a scheduling candidate
///
/// Runs before the candidate is granted the CPU. A default action may kill
/// the process (removing it from the ready queue); the caller re-checks the
/// queue head afterwards.
pub fn check_pending_signals(k: &mut Kernel, idx: usize) {
    while let Some(sig) = k.procs[idx].signals.first() {
        k.procs[idx].signals.remove(sig);
        if k.procs[idx].state == ProcState::Killed {
            break;
        }
        match k.procs[idx].handlers[sig as usize] {
            SigHandler::User(addr) => deliver_user(k, idx, sig, addr),
            SigHandler::Default => default_action(k, idx, sig),
        }
    }
}

/// Enter a user handler on the next return to EL0
///
/// The interrupted PC moves to x30 so the handler's `ret` resumes it; the
/// handler entry goes one-shot back to default.
fn deliver_user(k: &mut Kernel, idx: usize, sig: u32, addr: u64) {
    let frame = k.procs[idx].frame();
    unsafe {
        (*frame).x[30] = (*frame).elr;
        (*frame).x[0] = sig as u64;
        (*frame).elr = addr;
    }
    k.procs[idx].handlers[sig as usize] = SigHandler::Default;
}

/// Kernel default action for a signal
fn default_action(k: &mut Kernel, idx: usize, sig: u32) {
    match sig {
        // The status word delivered with SIGCHLD has served its purpose
        SIGCHLD => k.procs[idx].status = 0,
        // init survives a hangup; everything else exits
        SIGHUP if k.procs[idx].pid == 1 => {}
        _ => proc::exit_process(k, idx, sig as i32, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigset_bit_per_signum() {
        let mut set = SigSet::new();
        assert!(set.is_empty());
        set.add(SIGTERM);
        set.add(SIGINT);
        assert!(set.contains(SIGTERM));
        assert!(set.contains(SIGINT));
        assert!(!set.contains(SIGHUP));
        assert_eq!(set.first(), Some(SIGINT));
        set.remove(SIGINT);
        assert_eq!(set.first(), Some(SIGTERM));
    }

    #[test]
    fn out_of_range_signals_are_ignored() {
        let mut set = SigSet::new();
        set.add(40);
        assert!(set.is_empty());
        assert!(!valid_signal(32));
        assert!(!valid_signal(-1));
        assert!(valid_signal(0));
        assert!(valid_signal(31));
    }
}
