//! Leveled kernel logging.
//!
//! A single process-wide [`LogSink`] receives every record that passes
//! the level filter; until one is registered, records are discarded.
//! The boot path points the sink at the console device; a serial or
//! ring-buffer sink would slot in the same way. Filtering happens here,
//! before formatting reaches the sink, so a quiet level keeps debug
//! spam out of the sink's lock entirely.

extern crate alloc;

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::sync::SpinLock;

/// Kernel log severity. Lower = more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Something failed; the system may continue.
    Error = 0,
    /// High-level progress messages.
    Info = 1,
    /// Detailed diagnostics, off by default.
    Debug = 2,
}

impl LogLevel {
    /// Returns the fixed-width display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
        }
    }

    const fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::Error,
            1 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// A destination for log records.
///
/// Implementations must tolerate being called from any kernel context;
/// in particular they must not block on anything that logs.
pub trait LogSink: Send + Sync {
    /// Delivers one record that already passed the level filter.
    fn write(&self, level: LogLevel, args: fmt::Arguments<'_>);
}

static SINK: SpinLock<Option<Arc<dyn LogSink>>> = SpinLock::named("logsink", None);

/// Most verbose level that reaches the sink. Defaults to `Info`.
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Registers the log sink. May be called again to swap sinks (e.g.
/// early serial first, the console once devices are up).
pub fn set_sink(sink: Arc<dyn LogSink>) {
    *SINK.lock() = Some(sink);
}

/// Sets the most verbose level that reaches the sink.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Release);
}

/// Returns the current filter level.
pub fn max_level() -> LogLevel {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Acquire))
}

/// Implementation detail for [`klog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level > max_level() {
        return;
    }
    // Take the sink out of the lock before delivering so a slow sink
    // never holds up registration.
    let sink = SINK.lock().clone();
    if let Some(sink) = sink {
        sink.write(level, args);
    }
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}
