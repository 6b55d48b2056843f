//! The console device.
//!
//! Backs the standard file descriptors. Writes land in an output
//! buffer (mirrored to the kernel log sink); reads drain a script
//! buffer that boot code or tests can fill. Not seekable.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use ferrite_core::log::{LogLevel, LogSink};
use ferrite_core::sync::SpinLock;
use ferrite_core::syscall::Errno;

use super::vfs::Vnode;

/// The console device vnode.
pub struct Console {
    input: SpinLock<VecDeque<u8>>,
    output: SpinLock<Vec<u8>>,
}

impl Console {
    /// Creates a console with empty buffers.
    pub const fn new() -> Self {
        Self {
            input: SpinLock::new(VecDeque::new()),
            output: SpinLock::new(Vec::new()),
        }
    }

    /// Queues bytes for subsequent reads.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Returns a copy of everything written so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// The console doubles as the kernel's log sink: records land in the
/// same output stream user writes do, prefixed with their level.
impl LogSink for Console {
    fn write(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let line = alloc::format!("[{}] {}\n", level.name(), args);
        self.output.lock().extend_from_slice(line.as_bytes());
    }
}

impl Vnode for Console {
    fn read_at(&self, _offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut input = self.input.lock();
        let mut n = 0;
        while n < buf.len() {
            match input.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_at(&self, _offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        self.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        0
    }

    fn is_seekable(&self) -> bool {
        false
    }
}
