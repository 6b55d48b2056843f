//! Kernel tunables.

/// Lowest PID handed out to user processes.
pub const PID_MIN: u32 = 2;

/// One past the highest PID; also the process-table size.
pub const PID_MAX: u32 = 256;

/// Per-process file-table size.
pub const OPEN_MAX: usize = 128;

/// Longest file-name string accepted from user space, NUL excluded.
pub const NAME_MAX: usize = 255;

/// Longest path string accepted from user space, NUL excluded.
pub const PATH_MAX: usize = 1024;

/// Total bytes of padded argv strings accepted by exec.
pub const ARG_MAX: usize = 65536;

/// Maximum number of argv entries accepted by exec.
pub const MAX_ARGS: usize = 1024;
