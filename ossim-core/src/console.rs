//! Byte-at-a-time console I/O against the `P(writeDone); putChar` / `P(readAvail);
//! getChar` semaphore protocol from the specification's console glue. The
//! simulated kernel is single-threaded and synchronous (there is no second
//! thread racing to raise the semaphore), so the pair collapses to a direct
//! call here — every character still goes through exactly one `put_char`/
//! `get_char` call, in program order.
//!
//! Known deviation: the real protocol blocks the calling thread on the
//! `writeDone`/`readAvail` semaphore until the device finishes, which is a
//! suspension point the scheduler can interleave another thread's CPU burst
//! around. Collapsing it to a direct call drops that suspension, so a
//! program whose only blocking point is a console write (e.g. "print one
//! line, then halt") runs its CPU burst to completion without ever yielding
//! — `numCpuBursts` for that program comes out lower here than it would
//! against the real protocol.

use crate::machine::ConsoleDevice;
use crate::stats::Statistics;

pub struct ConsoleIo;

impl ConsoleIo {
    pub fn new() -> Self {
        Self
    }

    pub fn put_char(&mut self, device: &mut dyn ConsoleDevice, stats: &mut Statistics, byte: u8) {
        device.put_char(byte);
        stats.num_console_chars_written += 1;
    }

    pub fn get_char(&mut self, device: &mut dyn ConsoleDevice, stats: &mut Statistics) -> u8 {
        let c = device.get_char();
        stats.num_console_chars_read += 1;
        c
    }

    /// Emits the digits of `n` with a single leading `-` iff negative;
    /// `n == 0` emits exactly `"0"`.
    pub fn print_int(&mut self, device: &mut dyn ConsoleDevice, stats: &mut Statistics, n: i64) {
        if n == 0 {
            self.put_char(device, stats, b'0');
            return;
        }
        let mut n = n;
        if n < 0 {
            self.put_char(device, stats, b'-');
            n = n.wrapping_neg();
        }
        for b in n.to_string().into_bytes() {
            self.put_char(device, stats, b);
        }
    }

    /// Emits `"0x"` followed by lowercase hex with no leading zeros; `u ==
    /// 0` emits exactly `"0x0"`.
    pub fn print_int_hex(&mut self, device: &mut dyn ConsoleDevice, stats: &mut Statistics, u: u32) {
        self.put_char(device, stats, b'0');
        self.put_char(device, stats, b'x');
        for b in format!("{u:x}").into_bytes() {
            self.put_char(device, stats, b);
        }
    }

    pub fn print_string(&mut self, device: &mut dyn ConsoleDevice, stats: &mut Statistics, bytes: &[u8]) {
        for &b in bytes {
            self.put_char(device, stats, b);
        }
    }
}

impl Default for ConsoleIo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<u8>);
    impl ConsoleDevice for Recorder {
        fn put_char(&mut self, byte: u8) {
            self.0.push(byte);
        }
        fn get_char(&mut self) -> u8 {
            0
        }
    }

    #[test]
    fn print_int_handles_zero_negative_and_positive() {
        let mut device = Recorder(Vec::new());
        let mut stats = Statistics::new();
        let mut io = ConsoleIo::new();
        io.print_int(&mut device, &mut stats, 0);
        io.print_int(&mut device, &mut stats, -42);
        io.print_int(&mut device, &mut stats, 7);
        assert_eq!(String::from_utf8(device.0).unwrap(), "0-427");
    }

    #[test]
    fn print_int_hex_zero_and_nonzero() {
        let mut device = Recorder(Vec::new());
        let mut stats = Statistics::new();
        let mut io = ConsoleIo::new();
        io.print_int_hex(&mut device, &mut stats, 0);
        io.print_int_hex(&mut device, &mut stats, 255);
        assert_eq!(String::from_utf8(device.0).unwrap(), "0x00xff");
    }
}
