//! Syscall ABI: call numbers, error numbers, and wait-status encoding.
//!
//! Grouped numbering with room for future expansion per category. The
//! dispatch boundary returns non-negative payloads on success and
//! `-(errno)` on failure; kernel-internal code uses [`Errno`] through
//! `Result` and converts at the edge.

use core::fmt;

// ── File operations (0x10–0x1F) ─────────────────────────────────────

/// Open a file by path.
pub const SYS_OPEN: usize = 0x10;
/// Read from an open file descriptor.
pub const SYS_READ: usize = 0x11;
/// Write to an open file descriptor.
pub const SYS_WRITE: usize = 0x12;
/// Close a file descriptor.
pub const SYS_CLOSE: usize = 0x13;
/// Duplicate a file descriptor onto another.
pub const SYS_DUP2: usize = 0x14;
/// Reposition a file offset.
pub const SYS_LSEEK: usize = 0x15;
/// Change the current directory.
pub const SYS_CHDIR: usize = 0x16;
/// Read the current directory path.
pub const SYS_GETCWD: usize = 0x17;

// ── Process lifecycle (0x20–0x2F) ───────────────────────────────────

/// Return the caller's process id.
pub const SYS_GETPID: usize = 0x20;
/// Duplicate the calling process.
pub const SYS_FORK: usize = 0x21;
/// Replace the calling process image.
pub const SYS_EXECV: usize = 0x22;
/// Wait for a child process to exit.
pub const SYS_WAITPID: usize = 0x23;
/// Terminate the calling process.
pub const SYS_EXIT: usize = 0x24;

// ── Memory (0x30–0x3F) ──────────────────────────────────────────────

/// Adjust the heap break.
pub const SYS_SBRK: usize = 0x30;

// ── lseek whence values ─────────────────────────────────────────────

/// Seek relative to the start of the file.
pub const SEEK_SET: i32 = 0;
/// Seek relative to the current offset.
pub const SEEK_CUR: i32 = 1;
/// Seek relative to the end of the file.
pub const SEEK_END: i32 = 2;

// ── waitpid options ─────────────────────────────────────────────────

/// Do not block if the child has not exited.
pub const WNOHANG: i32 = 1;
/// Also report stopped children (accepted, not implemented).
pub const WUNTRACED: i32 = 2;

// ── Error numbers ───────────────────────────────────────────────────

/// Kernel error numbers, surfaced to user space as negated syscall
/// return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// No such file or directory.
    NoEnt = 2,
    /// No such process.
    Srch = 3,
    /// I/O error.
    Io = 5,
    /// Argument list too long.
    TooBig = 7,
    /// Executable format error.
    NoExec = 8,
    /// Bad file descriptor.
    BadF = 9,
    /// No child processes (or not a child of the caller).
    Child = 10,
    /// Resource temporarily unavailable (process table full).
    Again = 11,
    /// Out of memory.
    NoMem = 12,
    /// Permission denied.
    Acces = 13,
    /// Bad address.
    Fault = 14,
    /// File exists.
    Exist = 17,
    /// Not a directory.
    NotDir = 20,
    /// Is a directory.
    IsDir = 21,
    /// Invalid argument.
    Inval = 22,
    /// Too many open files.
    MFile = 24,
    /// Illegal seek on a non-seekable object.
    SPipe = 29,
    /// Function not implemented.
    NoSys = 38,
}

impl Errno {
    /// Returns the numeric error code.
    pub const fn code(self) -> isize {
        self as i32 as isize
    }

    /// Returns the negated code used at the syscall boundary.
    pub const fn as_ret(self) -> isize {
        -(self as i32 as isize)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoEnt => "no such file or directory",
            Self::Srch => "no such process",
            Self::Io => "I/O error",
            Self::TooBig => "argument list too long",
            Self::NoExec => "executable format error",
            Self::BadF => "bad file descriptor",
            Self::Child => "no child processes",
            Self::Again => "resource temporarily unavailable",
            Self::NoMem => "out of memory",
            Self::Acces => "permission denied",
            Self::Fault => "bad address",
            Self::Exist => "file exists",
            Self::NotDir => "not a directory",
            Self::IsDir => "is a directory",
            Self::Inval => "invalid argument",
            Self::MFile => "too many open files",
            Self::SPipe => "illegal seek",
            Self::NoSys => "function not implemented",
        };
        f.write_str(name)
    }
}

/// Converts a syscall result into the boundary convention: the payload
/// on success, `-(errno)` on failure.
pub fn syscall_ret(result: Result<isize, Errno>) -> isize {
    match result {
        Ok(val) => {
            debug_assert!(val >= 0, "syscall success payload must be non-negative");
            val
        }
        Err(e) => e.as_ret(),
    }
}

// ── Wait-status encoding ────────────────────────────────────────────

/// Low two status bits: normal exit.
const STATUS_EXITED: i32 = 0;
/// Low two status bits: terminated by a signal.
const STATUS_SIGNALED: i32 = 1;

/// Encodes a normal exit code into a wait status.
pub const fn make_exit_status(code: i32) -> i32 {
    (code << 2) | STATUS_EXITED
}

/// Encodes a terminating signal into a wait status.
pub const fn make_signal_status(sig: i32) -> i32 {
    (sig << 2) | STATUS_SIGNALED
}

/// Returns `true` if the status records a normal exit.
pub const fn status_is_exit(status: i32) -> bool {
    status & 3 == STATUS_EXITED
}

/// Extracts the exit code from a normal-exit status.
pub const fn exit_status_of(status: i32) -> i32 {
    status >> 2
}

/// Returns `true` if the status records a signal termination.
pub const fn status_is_signal(status: i32) -> bool {
    status & 3 == STATUS_SIGNALED
}

/// Extracts the signal number from a signal-termination status.
pub const fn signal_of(status: i32) -> i32 {
    status >> 2
}
