//! kestrel kernel entry point
//!
//! The boot glue sets up EL1, the kernel identity mapping and the
//! exception vectors, loads the disk image, then jumps here. The boot
//! thread becomes the idle process.

#![cfg_attr(target_arch = "aarch64", no_std)]
#![cfg_attr(target_arch = "aarch64", no_main)]

use kestrel_kernel::printkln;

#[cfg(target_arch = "aarch64")]
use kestrel_kernel::{arch::cpu, fs, mm, task};

/// Kernel entry, called by the boot glue with IRQs masked
#[cfg(target_arch = "aarch64")]
#[unsafe(no_mangle)]
pub extern "C" fn kmain() -> ! {
    printkln!("kestrel starting...");

    mm::phys::init();
    fs::init();
    {
        let mut k = task::KERNEL.lock();
        task::proc::init(&mut k);
    }

    // The glue has armed the timer; from here preemption does the rest
    cpu::enable_irq();
    loop {
        cpu::wait_for_interrupt();
        if task::KERNEL.lock().shutdown {
            break;
        }
    }
    cpu::halt();
}

#[cfg(target_arch = "aarch64")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    printkln!("KERNEL PANIC: {}", info);
    kestrel_kernel::arch::cpu::halt();
}

/// The kernel only runs on aarch64; host builds exist for `cargo test`
#[cfg(not(target_arch = "aarch64"))]
fn main() {
    printkln!("kestrel is an aarch64 kernel; build for aarch64-unknown-none");
}
