//! Syscall dispatch.
//!
//! The trap layer decodes nothing: it hands the saved [`TrapFrame`] to
//! [`dispatch`], which routes on the syscall number in `v0` and the
//! arguments in `a0`-`a2`, and returns the boundary value (non-negative
//! payload or negated errno) for the trap layer to stuff back into the
//! frame. Handlers implement [`SyscallHandler`]; [`KernelDispatch`]
//! binds them to a kernel and a current process.
//!
//! Offsets cross this boundary as 32-bit values; a 64-bit `lseek`
//! offset would need a register pair, which this trap convention does
//! not carry.

mod file;
mod memory;
mod process;

extern crate alloc;

use alloc::sync::Arc;
use core::future::Future;

use ferrite_core::addr::VirtAddr;
use ferrite_core::id::{Fd, Pid};
use ferrite_core::syscall::{
    Errno, SYS_CHDIR, SYS_CLOSE, SYS_DUP2, SYS_EXECV, SYS_EXIT, SYS_FORK, SYS_GETCWD,
    SYS_GETPID, SYS_LSEEK, SYS_OPEN, SYS_READ, SYS_SBRK, SYS_WAITPID, SYS_WRITE, syscall_ret,
};

pub use file::{
    std_io_init, sys_chdir, sys_close, sys_dup2, sys_getcwd, sys_lseek, sys_open, sys_read,
    sys_write,
};
pub use memory::sys_sbrk;
pub use process::{sys_execv, sys_exit, sys_fork, sys_getpid, sys_waitpid};

use crate::arch::TrapFrame;
use crate::kernel::Kernel;
use crate::proc::Process;

/// The syscall surface, one method per call.
///
/// Methods return `Result<isize, Errno>`; [`dispatch`] folds that into
/// the boundary convention. `execv` only ever returns an error — on
/// success the task re-enters user mode and never comes back.
pub trait SyscallHandler {
    /// `open(path, flags) -> fd`
    fn sys_open(&self, path: VirtAddr, flags: u32) -> Result<isize, Errno>;
    /// `read(fd, buf, n) -> bytes`
    fn sys_read(&self, fd: Fd, buf: VirtAddr, len: usize) -> Result<isize, Errno>;
    /// `write(fd, buf, n) -> bytes`
    fn sys_write(&self, fd: Fd, buf: VirtAddr, len: usize) -> Result<isize, Errno>;
    /// `close(fd)`
    fn sys_close(&self, fd: Fd) -> Result<isize, Errno>;
    /// `dup2(old, new) -> new`
    fn sys_dup2(&self, old: Fd, new: Fd) -> Result<isize, Errno>;
    /// `lseek(fd, off, whence) -> newpos`
    fn sys_lseek(&self, fd: Fd, pos: i64, whence: i32) -> Result<isize, Errno>;
    /// `chdir(path)`
    fn sys_chdir(&self, path: VirtAddr) -> Result<isize, Errno>;
    /// `__getcwd(buf, n) -> bytes`
    fn sys_getcwd(&self, buf: VirtAddr, len: usize) -> Result<isize, Errno>;
    /// `getpid() -> pid`
    fn sys_getpid(&self) -> Result<isize, Errno>;
    /// `fork() -> child pid`
    fn sys_fork(&self, tf: &TrapFrame) -> Result<isize, Errno>;
    /// `execv(path, argv)`; diverges on success.
    fn sys_execv(&self, path: VirtAddr, argv: VirtAddr) -> Result<isize, Errno>;
    /// `waitpid(pid, &status, options) -> pid`
    fn sys_waitpid(
        &self,
        pid: Pid,
        status: VirtAddr,
        options: i32,
    ) -> impl Future<Output = Result<isize, Errno>> + Send;
    /// `_exit(code)`; the calling task must return after this resolves.
    fn sys_exit(&self, code: i32) -> impl Future<Output = Result<isize, Errno>> + Send;
    /// `sbrk(delta) -> old_break`
    fn sys_sbrk(&self, delta: isize) -> Result<isize, Errno>;
}

/// Routes a trapped syscall to its handler and folds the result into
/// the boundary convention. Unknown numbers fail with not-implemented.
pub async fn dispatch<H: SyscallHandler>(handler: &H, tf: &TrapFrame) -> isize {
    let nr = tf.v0 as usize;
    let a0 = tf.a0;
    let a1 = tf.a1;
    let a2 = tf.a2;

    let result = match nr {
        SYS_OPEN => handler.sys_open(VirtAddr::new(u64::from(a0)), a1),
        SYS_READ => handler.sys_read(Fd::new(a0), VirtAddr::new(u64::from(a1)), a2 as usize),
        SYS_WRITE => handler.sys_write(Fd::new(a0), VirtAddr::new(u64::from(a1)), a2 as usize),
        SYS_CLOSE => handler.sys_close(Fd::new(a0)),
        SYS_DUP2 => handler.sys_dup2(Fd::new(a0), Fd::new(a1)),
        SYS_LSEEK => handler.sys_lseek(Fd::new(a0), i64::from(a1 as i32), a2 as i32),
        SYS_CHDIR => handler.sys_chdir(VirtAddr::new(u64::from(a0))),
        SYS_GETCWD => handler.sys_getcwd(VirtAddr::new(u64::from(a0)), a1 as usize),
        SYS_GETPID => handler.sys_getpid(),
        SYS_FORK => handler.sys_fork(tf),
        SYS_EXECV => {
            handler.sys_execv(VirtAddr::new(u64::from(a0)), VirtAddr::new(u64::from(a1)))
        }
        SYS_WAITPID => {
            handler
                .sys_waitpid(Pid::new(a0), VirtAddr::new(u64::from(a1)), a2 as i32)
                .await
        }
        SYS_EXIT => handler.sys_exit(a0 as i32).await,
        SYS_SBRK => handler.sys_sbrk(a0 as i32 as isize),
        _ => Err(Errno::NoSys),
    };
    syscall_ret(result)
}

/// [`SyscallHandler`] bound to a kernel and the current process.
pub struct KernelDispatch {
    /// The kernel the process lives in.
    pub kernel: Arc<Kernel>,
    /// The process that trapped.
    pub proc: Arc<Process>,
}

impl SyscallHandler for KernelDispatch {
    fn sys_open(&self, path: VirtAddr, flags: u32) -> Result<isize, Errno> {
        file::sys_open(&self.proc, &self.kernel.vfs, &self.kernel.coremap, path, flags)
            .map(|fd| fd.as_u32() as isize)
    }

    fn sys_read(&self, fd: Fd, buf: VirtAddr, len: usize) -> Result<isize, Errno> {
        file::sys_read(&self.proc, &self.kernel.coremap, fd, buf, len).map(|n| n as isize)
    }

    fn sys_write(&self, fd: Fd, buf: VirtAddr, len: usize) -> Result<isize, Errno> {
        file::sys_write(&self.proc, &self.kernel.coremap, fd, buf, len).map(|n| n as isize)
    }

    fn sys_close(&self, fd: Fd) -> Result<isize, Errno> {
        file::sys_close(&self.proc, fd).map(|()| 0)
    }

    fn sys_dup2(&self, old: Fd, new: Fd) -> Result<isize, Errno> {
        file::sys_dup2(&self.proc, old, new).map(|fd| fd.as_u32() as isize)
    }

    fn sys_lseek(&self, fd: Fd, pos: i64, whence: i32) -> Result<isize, Errno> {
        file::sys_lseek(&self.proc, fd, pos, whence).map(|off| off as isize)
    }

    fn sys_chdir(&self, path: VirtAddr) -> Result<isize, Errno> {
        file::sys_chdir(&self.proc, &self.kernel.vfs, &self.kernel.coremap, path).map(|()| 0)
    }

    fn sys_getcwd(&self, buf: VirtAddr, len: usize) -> Result<isize, Errno> {
        file::sys_getcwd(&self.proc, &self.kernel.coremap, buf, len).map(|n| n as isize)
    }

    fn sys_getpid(&self) -> Result<isize, Errno> {
        Ok(process::sys_getpid(&self.proc).as_u32() as isize)
    }

    fn sys_fork(&self, tf: &TrapFrame) -> Result<isize, Errno> {
        process::sys_fork(&self.kernel, &self.proc, tf).map(|pid| pid.as_u32() as isize)
    }

    fn sys_execv(&self, path: VirtAddr, argv: VirtAddr) -> Result<isize, Errno> {
        process::sys_execv(&self.kernel, &self.proc, path, argv)
    }

    async fn sys_waitpid(
        &self,
        pid: Pid,
        status: VirtAddr,
        options: i32,
    ) -> Result<isize, Errno> {
        process::sys_waitpid(&self.kernel, &self.proc, pid, status, options).await
    }

    async fn sys_exit(&self, code: i32) -> Result<isize, Errno> {
        process::sys_exit(&self.kernel, &self.proc, code).await;
        Ok(0)
    }

    fn sys_sbrk(&self, delta: isize) -> Result<isize, Errno> {
        memory::sys_sbrk(&self.proc, delta).map(|old| old.as_u64() as isize)
    }
}
