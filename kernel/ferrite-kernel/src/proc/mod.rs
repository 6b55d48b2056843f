//! Process management: the process record, fork, and the exit/wait
//! rendezvous.
//!
//! A process's kernel thread is an async task; the task body returns
//! after [`exit`] runs, which is how the thread terminates. The
//! exit/wait handshake is a monitor: `exit_state` under its mutex plus
//! `exit_cv`, with Mesa-style re-checking on the waiting side. A parent
//! that survives its child reaps it in [`waitpid`]; a child whose
//! parent is already gone reaps itself.

extern crate alloc;

pub mod binfmt;
pub mod exec;
mod table;

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;

use ferrite_core::id::Pid;
use ferrite_core::kdebug;
use ferrite_core::sync::{Condvar, IrqSpinLock, Mutex, SpinLock};
use ferrite_core::syscall::{
    Errno, WNOHANG, WUNTRACED, make_exit_status, make_signal_status,
};
use ferrite_mm::tlb::Tlb;
use ferrite_mm::{AddressSpace, CoremapCell};

pub use table::ProcessTable;

use crate::arch::{TrapFrame, enter_user_mode};
use crate::fs::FileTable;
use crate::fs::vfs::Cwd;

/// Exit rendezvous state, guarded by the process's exit mutex.
pub struct ExitState {
    /// Set once the process has exited.
    pub exited: bool,
    /// Encoded wait status; valid once `exited` is set.
    pub code: i32,
}

/// A process.
pub struct Process {
    pid: Pid,
    ppid: Pid,
    name: String,
    /// The user address space. `None` between exec teardown and rebuild,
    /// and after reaping.
    pub addr_space: SpinLock<Option<AddressSpace>>,
    /// Current directory.
    pub cwd: SpinLock<Cwd>,
    /// Open files.
    pub files: SpinLock<FileTable>,
    exit_state: Mutex<ExitState>,
    exit_cv: Condvar,
}

impl Process {
    /// Creates a fresh process record with an empty file table and the
    /// root directory as cwd.
    pub fn new(pid: Pid, ppid: Pid, name: &str) -> Self {
        Self {
            pid,
            ppid,
            name: name.to_string(),
            addr_space: SpinLock::named("addrspace", None),
            cwd: SpinLock::named("cwd", Cwd::root()),
            files: SpinLock::named("filetable", FileTable::new()),
            exit_state: Mutex::new(
                "exit",
                ExitState {
                    exited: false,
                    code: 0,
                },
            ),
            exit_cv: Condvar::new("exitcv"),
        }
    }

    /// Returns the process id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Returns the parent's process id.
    pub fn ppid(&self) -> Pid {
        self.ppid
    }

    /// Returns the process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the process has exited (is a zombie or
    /// about to be reaped).
    pub async fn has_exited(&self) -> bool {
        self.exit_state.lock().await.exited
    }
}

/// Outcome of a [`waitpid`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The child exited; its slot has been reaped.
    Exited {
        /// PID of the collected child.
        pid: Pid,
        /// Encoded wait status.
        status: i32,
    },
    /// `WNOHANG` was set and the child is still running.
    StillRunning,
}

/// Releases everything a zombie still owns: its address space, its
/// table slot, and (once the last `Arc` drops) the record itself.
fn reap(table: &ProcessTable, proc: &Process, coremap: &CoremapCell) {
    let aspace = proc.addr_space.lock().take();
    if let Some(aspace) = aspace {
        coremap.with(|cm| aspace.destroy(cm));
    }
    table.remove(proc.pid());
    kdebug!("proc {}: reaped", proc.pid());
}

/// Waits for child `pid` to exit and reaps it.
///
/// The caller must be the child's parent. With `WNOHANG`, a child that
/// has not exited yet yields [`WaitOutcome::StillRunning`] instead of
/// blocking. `WUNTRACED` is accepted and behaves like 0 (no job
/// control here).
pub async fn waitpid(
    table: &ProcessTable,
    caller: &Process,
    pid: Pid,
    options: i32,
    coremap: &CoremapCell,
) -> Result<WaitOutcome, Errno> {
    if options != 0 && options != WNOHANG && options != WUNTRACED {
        return Err(Errno::Inval);
    }
    if !ProcessTable::pid_in_range(pid) {
        return Err(Errno::Srch);
    }
    let target = table.lookup(pid).ok_or(Errno::Srch)?;
    if target.ppid() != caller.pid() {
        return Err(Errno::Child);
    }

    let mut state = target.exit_state.lock().await;
    if !state.exited {
        if options == WNOHANG {
            return Ok(WaitOutcome::StillRunning);
        }
        while !state.exited {
            state = target.exit_cv.wait(state).await;
        }
    }
    let status = state.code;
    drop(state);

    reap(table, &target, coremap);
    Ok(WaitOutcome::Exited { pid, status })
}

/// Terminates the calling process.
///
/// Records the encoded status and, if the parent is still around,
/// broadcasts the exit condvar so a waiting parent collects it. A
/// process whose parent is already gone reaps itself. The caller's
/// task must return immediately afterwards; that return is the thread
/// exit.
pub async fn exit(
    table: &ProcessTable,
    proc: &Arc<Process>,
    code: i32,
    signaled: bool,
    coremap: &CoremapCell,
) {
    let status = if signaled {
        make_signal_status(code)
    } else {
        make_exit_status(code)
    };

    let mut state = proc.exit_state.lock().await;
    state.exited = true;
    state.code = status;

    let parent_alive = match table.lookup(proc.ppid()) {
        Some(parent) => !parent.exit_state.lock().await.exited,
        None => false,
    };

    if parent_alive {
        // The parent will reap; hand it the status.
        proc.exit_cv.broadcast(&state);
        drop(state);
    } else {
        drop(state);
        reap(table, proc, coremap);
    }
    kdebug!("proc {}: exited with status {:#x}", proc.pid(), status);
}

/// Builds everything a forked child needs before its thread runs: a
/// kernel copy of the parent's trap frame, a deep copy of the address
/// space, and a fresh process record sharing the parent's open files
/// and cwd.
///
/// On failure every partially constructed piece is released, newest
/// first, and no-memory (or table-full) surfaces to the caller.
pub fn fork_prepare(
    table: &ProcessTable,
    parent: &Process,
    tf: &TrapFrame,
    coremap: &CoremapCell,
) -> Result<(Arc<Process>, Box<TrapFrame>), Errno> {
    let child_tf = Box::new(*tf);

    let child_aspace = {
        let parent_aspace = parent.addr_space.lock();
        let aspace = parent_aspace.as_ref().ok_or(Errno::Fault)?;
        coremap.with(|cm| aspace.copy(cm))?
    };

    let child = match table.spawn(parent.name(), parent.pid()) {
        Ok(child) => child,
        Err(e) => {
            coremap.with(|cm| child_aspace.destroy(cm));
            return Err(e);
        }
    };

    *child.addr_space.lock() = Some(child_aspace);
    *child.files.lock() = parent.files.lock().duplicate();
    {
        let parent_cwd = parent.cwd.lock();
        *child.cwd.lock() = Cwd {
            path: parent_cwd.path.clone(),
            vnode: parent_cwd.vnode.clone(),
        };
    }

    Ok((child, child_tf))
}

/// The child half of fork: runs as the child's kernel task.
///
/// Installs the copied address space on the CPU, rewrites the trap
/// frame so the syscall returns 0 in the child, and drops to user mode.
pub async fn child_task(
    child: Arc<Process>,
    tf: Box<TrapFrame>,
    tlb: Arc<IrqSpinLock<Tlb>>,
) {
    {
        let aspace = child.addr_space.lock();
        aspace
            .as_ref()
            .expect("forked child has an address space")
            .activate(&tlb);
    }
    let frame = tf.for_child();
    enter_user_mode(&frame)
}
