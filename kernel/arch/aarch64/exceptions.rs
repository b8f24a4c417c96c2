//! Kernel-side trap interface (aarch64)
//!
//! The exception vector table, register save/restore and `eret` live in
//! the external assembly glue. The glue stores the context frame at the
//! top of the current kernel stack, masks IRQs architecturally, and calls
//! one of the entry points below; returning re-enters the glue's restore
//! path.

use crate::arch::context::ContextFrame;
use crate::signal::{self, SIGINT};
use crate::task::{KERNEL, event, proc, sched};
use crate::{console, printkln, syscall};

/// Ctrl+C on the console line
const ETX: u8 = 0x03;

/// EL0 `svc`: dispatch a system call
#[unsafe(no_mangle)]
pub extern "C" fn kernel_syscall(frame: &mut ContextFrame) {
    syscall::dispatch(frame);
}

/// Timer IRQ, already acknowledged by the external timer driver
#[unsafe(no_mangle)]
pub extern "C" fn kernel_timer_tick() {
    let mut k = KERNEL.lock();
    sched::timer_tick(&mut k);
}

/// UART RX IRQ: one received byte
///
/// Ctrl+C turns into SIGINT for the foreground process; everything else is
/// queued for `getchar` and the console sleepers are woken.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_console_rx(byte: u8) {
    let mut k = KERNEL.lock();
    if byte == ETX {
        if let Some(fg) = k.fg_process() {
            signal::send_signal(&mut k, fg, SIGINT);
        }
        return;
    }
    console::push_input(byte);
    sched::wake_up(&mut k, event::CONSOLE_RX);
}

/// Any exception the glue has no dedicated path for
///
/// A fault taken from EL0 kills the offending process; a fault in the
/// kernel itself is unrecoverable.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_fatal(frame: &mut ContextFrame) {
    // SPSR mode field: 0 = EL0t
    if frame.spsr & 0xf == 0 {
        let mut k = KERNEL.lock();
        let cur = k.current;
        printkln!(
            "fatal exception: pid {} ({}) elr={:#x} esr={:#x}",
            k.procs[cur].pid,
            k.procs[cur].name_str(),
            frame.elr,
            frame.esr
        );
        proc::exit_process(&mut k, cur, 1, false);
        unreachable!("exit of the faulting process returned");
    }
    panic!(
        "kernel exception: trapno={} elr={:#x} esr={:#x}",
        frame.trapno, frame.elr, frame.esr
    );
}
