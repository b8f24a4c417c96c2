//! Kernel console
//!
//! Transmit goes straight to the external MMIO UART driver. Receive is fed
//! one byte at a time by the UART IRQ path (`kernel_console_rx`) into a
//! fixed ring buffer that blocking readers drain.

use crate::arch::IrqLock;

/// Size of the input ring (must be a power of 2)
const INPUT_BUFFER_SIZE: usize = 256;

// External MMIO UART driver (polled TX)
#[cfg(target_arch = "aarch64")]
unsafe extern "C" {
    fn uart_send(byte: u8);
}

/// Host builds (unit tests) never transmit
#[cfg(not(target_arch = "aarch64"))]
unsafe fn uart_send(_byte: u8) {}

/// Input ring buffer filled from the RX interrupt
struct InputBuffer {
    data: [u8; INPUT_BUFFER_SIZE],
    head: usize,
    tail: usize,
}

impl InputBuffer {
    const fn new() -> Self {
        Self {
            data: [0; INPUT_BUFFER_SIZE],
            head: 0,
            tail: 0,
        }
    }

    /// Store a byte; the oldest byte is dropped when the ring is full
    fn push(&mut self, byte: u8) {
        self.data[self.head] = byte;
        self.head = (self.head + 1) & (INPUT_BUFFER_SIZE - 1);
        if self.head == self.tail {
            self.tail = (self.tail + 1) & (INPUT_BUFFER_SIZE - 1);
        }
    }

    fn pop(&mut self) -> Option<u8> {
        if self.tail == self.head {
            return None;
        }
        let byte = self.data[self.tail];
        self.tail = (self.tail + 1) & (INPUT_BUFFER_SIZE - 1);
        Some(byte)
    }
}

static INPUT: IrqLock<InputBuffer> = IrqLock::new(InputBuffer::new());

/// Write raw bytes to the UART
///
/// Callers serialize through printk's output lock; this only feeds the FIFO.
pub fn write_bytes(bytes: &[u8]) {
    for &b in bytes {
        unsafe {
            if b == b'\n' {
                uart_send(b'\r');
            }
            uart_send(b);
        }
    }
}

/// Queue a received byte from the RX interrupt path
pub fn push_input(byte: u8) {
    INPUT.lock().push(byte);
}

/// Take one byte of pending console input, if any
pub fn try_getc() -> Option<u8> {
    INPUT.lock().pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_ring_fifo_order() {
        let mut buf = InputBuffer::new();
        buf.push(b'a');
        buf.push(b'b');
        assert_eq!(buf.pop(), Some(b'a'));
        assert_eq!(buf.pop(), Some(b'b'));
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn input_ring_overwrites_oldest_when_full() {
        let mut buf = InputBuffer::new();
        for i in 0..INPUT_BUFFER_SIZE {
            buf.push(i as u8);
        }
        // Ring holds SIZE-1 distinguishable bytes; the first one is gone
        buf.push(0xff);
        let first = buf.pop().unwrap();
        assert_ne!(first, 0);
    }
}
