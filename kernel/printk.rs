//! Kernel printk
//!
//! Formatted output to the platform UART. The output lock is held for the
//! whole formatted message so lines from the syscall path and the IRQ path
//! never interleave.
//!
//! Single-core: the lock is an IRQ mask, not a spinlock, so printk is safe
//! to call from interrupt handlers and from the panic path.

use ::core::fmt::{self, Write};

use crate::arch::IrqLock;
use crate::console;

/// Output lock - serializes all console writes
static OUTPUT_LOCK: IrqLock<()> = IrqLock::new(());

/// Printk writer for fmt::Write
///
/// Holds OUTPUT_LOCK for the duration of all write_str calls,
/// ensuring entire formatted messages are written atomically.
pub struct PrintkWriter {
    _guard: crate::arch::IrqLockGuard<'static, ()>,
}

impl PrintkWriter {
    /// Create a new PrintkWriter, acquiring the output lock
    pub fn new() -> Self {
        Self {
            _guard: OUTPUT_LOCK.lock(),
        }
    }
}

impl Default for PrintkWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for PrintkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        console::write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Print to the kernel console
///
/// Always succeeds - never blocks on anything but the UART FIFO.
#[macro_export]
macro_rules! printk {
    ($($arg:tt)*) => {{
        use ::core::fmt::Write;
        let mut writer = $crate::printk::PrintkWriter::new();
        let _ = write!(writer, $($arg)*);
        // writer dropped here, releasing the output lock
    }};
}

/// Print to the kernel console with newline
///
/// Uses a single writer for the message and newline to ensure atomicity.
#[macro_export]
macro_rules! printkln {
    () => {
        $crate::printk!("\n")
    };
    ($($arg:tt)*) => {{
        use ::core::fmt::Write;
        let mut writer = $crate::printk::PrintkWriter::new();
        let _ = write!(writer, $($arg)*);
        let _ = writer.write_str("\n");
    }};
}
