//! Process syscall handlers: getpid, fork, execv, waitpid, _exit.

extern crate alloc;

use alloc::sync::Arc;

use ferrite_core::addr::VirtAddr;
use ferrite_core::id::Pid;
use ferrite_core::syscall::Errno;

use crate::arch::{TrapFrame, enter_new_process};
use crate::kernel::Kernel;
use crate::proc::{self, Process, WaitOutcome, child_task};
use crate::usercopy::{check_user_range, copy_out};

/// `getpid() -> pid`
pub fn sys_getpid(proc: &Process) -> Pid {
    proc.pid()
}

/// `fork() -> child pid` (0 in the child, via its rewritten frame)
///
/// Prepares the child and hands its kernel task to the executor; the
/// task installs the copied address space and drops to user mode as if
/// returning from this very syscall.
pub fn sys_fork(kernel: &Kernel, proc: &Process, tf: &TrapFrame) -> Result<Pid, Errno> {
    let (child, child_tf) = proc::fork_prepare(&kernel.table, proc, tf, &kernel.coremap)?;
    let pid = child.pid();
    kernel
        .executor
        .spawn_named("process", child_task(child, child_tf, kernel.tlb.clone()));
    Ok(pid)
}

/// `execv(path, argv)`
///
/// Does not return on success: the calling task re-enters user mode in
/// the new image.
pub fn sys_execv(
    kernel: &Kernel,
    proc: &Process,
    progname_ptr: VirtAddr,
    argv_ptr: VirtAddr,
) -> Result<isize, Errno> {
    let loader = kernel.loader().ok_or(Errno::NoExec)?;
    let prep = proc::exec::exec_prepare(
        proc,
        progname_ptr,
        argv_ptr,
        &kernel.vfs,
        loader.as_ref(),
        &kernel.coremap,
        &kernel.tlb,
    )?;
    enter_new_process(
        prep.argc,
        prep.stackptr,
        prep.stackptr,
        prep.stackptr,
        prep.entry,
    )
}

/// `waitpid(pid, &status, options) -> pid`
///
/// Validates the status pointer (non-null, aligned, user-space) before
/// touching anything, then defers to the lifecycle wait and writes the
/// collected status out.
pub async fn sys_waitpid(
    kernel: &Kernel,
    proc: &Process,
    pid: Pid,
    status_ptr: VirtAddr,
    options: i32,
) -> Result<isize, Errno> {
    if !status_ptr.is_aligned(4) {
        return Err(Errno::Fault);
    }
    check_user_range(status_ptr, core::mem::size_of::<i32>())?;

    match proc::waitpid(&kernel.table, proc, pid, options, &kernel.coremap).await? {
        WaitOutcome::StillRunning => Ok(0),
        WaitOutcome::Exited { pid, status } => {
            let mut aspace = proc.addr_space.lock();
            let aspace = aspace.as_mut().ok_or(Errno::Fault)?;
            kernel
                .coremap
                .with(|cm| copy_out(aspace, cm, status_ptr, &status.to_ne_bytes()))?;
            Ok(pid.as_u32() as isize)
        }
    }
}

/// `_exit(code)`
///
/// The calling task must return right after this resolves; that return
/// is the thread exit.
pub async fn sys_exit(kernel: &Kernel, proc: &Arc<Process>, code: i32) {
    proc::exit(&kernel.table, proc, code, false, &kernel.coremap).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFile;
    use crate::proc::binfmt::FlatImageLoader;
    use ferrite_core::addr::PAGE_SIZE;
    use ferrite_core::syscall::{WNOHANG, exit_status_of, status_is_exit};
    use ferrite_mm::{AddressSpace, RegionPerms};

    fn test_kernel() -> Arc<Kernel> {
        let kernel = Kernel::for_tests(64);
        kernel.set_loader(Arc::new(FlatImageLoader::at_default_base()));
        kernel.vfs.register_dir("/bin");
        kernel
            .vfs
            .register_file("/bin/prog", MemFile::with_contents(b"image".to_vec()));
        Arc::new(kernel)
    }

    fn user_proc(kernel: &Kernel) -> Arc<Process> {
        let proc = kernel.table.spawn("user", Pid::new(1)).unwrap();
        let mut aspace = AddressSpace::new();
        aspace.define_region(
            VirtAddr::new(0x0100_0000),
            4 * PAGE_SIZE as u64,
            RegionPerms::READ | RegionPerms::WRITE,
        );
        *proc.addr_space.lock() = Some(aspace);
        proc
    }

    #[test]
    fn getpid_returns_own_pid() {
        let kernel = test_kernel();
        let proc = user_proc(&kernel);
        assert_eq!(sys_getpid(&proc), proc.pid());
    }

    #[test]
    fn fork_allocates_child_and_schedules_task() {
        let kernel = test_kernel();
        let proc = user_proc(&kernel);

        let tf = TrapFrame {
            v0: 121,
            epc: 0x0100_0100,
            ..TrapFrame::default()
        };
        let child_pid = sys_fork(&kernel, &proc, &tf).unwrap();

        let child = kernel.table.lookup(child_pid).expect("child in table");
        assert_eq!(child.ppid(), proc.pid());
        assert_eq!(kernel.executor.task_count(), 1, "child task scheduled");
    }

    #[test]
    fn waitpid_roundtrip_with_status_write() {
        // Exit/wait rendezvous at the syscall layer: the child record
        // exits with 7, waitpid collects its pid and an exit status of 7.
        let kernel = test_kernel();
        let parent = user_proc(&kernel);
        let child = kernel.table.spawn("child", parent.pid()).unwrap();
        let child_pid = child.pid();

        {
            let kernel = kernel.clone();
            kernel.executor.clone().spawn_named("child", async move {
                sys_exit(&kernel, &child, 7).await;
            });
        }

        let status_ptr = VirtAddr::new(0x0100_0040);
        let ret = {
            let kernel = kernel.clone();
            let parent2 = parent.clone();
            kernel.executor.clone().block_on(async move {
                sys_waitpid(&kernel, &parent2, child_pid, status_ptr, 0).await
            })
        }
        .unwrap();
        assert_eq!(ret, child_pid.as_u32() as isize);

        // Read the status the kernel wrote into parent memory.
        let dm = kernel.coremap.with(|cm| cm.dirmap());
        let aspace = parent.addr_space.lock();
        let mut bytes = [0u8; 4];
        crate::usercopy::copy_in(aspace.as_ref().unwrap(), &dm, status_ptr, &mut bytes).unwrap();
        let status = i32::from_ne_bytes(bytes);
        assert!(status_is_exit(status));
        assert_eq!(exit_status_of(status), 7);

        assert!(kernel.table.lookup(child_pid).is_none(), "child reaped");
    }

    #[test]
    fn waitpid_validates_status_pointer() {
        let kernel = test_kernel();
        let parent = user_proc(&kernel);
        let child = kernel.table.spawn("child", parent.pid()).unwrap();
        let child_pid = child.pid();

        let (null, misaligned, kernel_band) = {
            let kernel = kernel.clone();
            let parent = parent.clone();
            kernel.executor.clone().block_on(async move {
                (
                    sys_waitpid(&kernel, &parent, child_pid, VirtAddr::zero(), WNOHANG).await,
                    sys_waitpid(&kernel, &parent, child_pid, VirtAddr::new(0x0100_0002), WNOHANG)
                        .await,
                    sys_waitpid(&kernel, &parent, child_pid, VirtAddr::new(0x8000_0000), WNOHANG)
                        .await,
                )
            })
        };
        assert_eq!(null.err(), Some(Errno::Fault));
        assert_eq!(misaligned.err(), Some(Errno::Fault));
        assert_eq!(kernel_band.err(), Some(Errno::Fault));
        drop(child);
    }

    #[test]
    fn execv_missing_loader_refused() {
        let kernel = Arc::new(Kernel::for_tests(32));
        let proc = user_proc(&kernel);
        assert_eq!(
            sys_execv(
                &kernel,
                &proc,
                VirtAddr::new(0x0100_0000),
                VirtAddr::new(0x0100_0010)
            )
            .err(),
            Some(Errno::NoExec)
        );
    }
}
