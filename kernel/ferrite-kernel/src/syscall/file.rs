//! File syscall handlers: open, read, write, close, dup2, lseek,
//! chdir, __getcwd, and standard-stream setup.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use ferrite_core::addr::VirtAddr;
use ferrite_core::id::Fd;
use ferrite_core::syscall::Errno;
use ferrite_mm::CoremapCell;

use crate::fs::vfs::Cwd;
use crate::fs::{Console, FileHandle, OpenFlags, Vfs};
use crate::param::PATH_MAX;
use crate::proc::Process;
use crate::usercopy::{check_user_range, copy_in, copy_in_str, copy_out};

/// Copies a path string in from user space.
fn path_from_user(
    proc: &Process,
    coremap: &CoremapCell,
    path_ptr: VirtAddr,
) -> Result<String, Errno> {
    let dm = coremap.with(|cm| cm.dirmap());
    let aspace = proc.addr_space.lock();
    let aspace = aspace.as_ref().ok_or(Errno::Fault)?;
    let bytes = copy_in_str(aspace, &dm, path_ptr, PATH_MAX)?;
    String::from_utf8(bytes).map_err(|_| Errno::Inval)
}

/// `open(path, flags) -> fd`
pub fn sys_open(
    proc: &Process,
    vfs: &Vfs,
    coremap: &CoremapCell,
    path_ptr: VirtAddr,
    flags_raw: u32,
) -> Result<Fd, Errno> {
    let flags = OpenFlags::from_posix(flags_raw)?;
    let path = path_from_user(proc, coremap, path_ptr)?;
    let vnode = vfs.resolve(&path)?;
    let handle = FileHandle::new(vnode, flags);
    proc.files.lock().insert(handle)
}

/// `read(fd, buf, n) -> bytes`
pub fn sys_read(
    proc: &Process,
    coremap: &CoremapCell,
    fd: Fd,
    buf_ptr: VirtAddr,
    len: usize,
) -> Result<usize, Errno> {
    check_user_range(buf_ptr, len)?;
    let handle = proc.files.lock().get(fd)?;

    let mut kbuf = vec![0u8; len];
    let n = handle.read(&mut kbuf)?;

    let mut aspace = proc.addr_space.lock();
    let aspace = aspace.as_mut().ok_or(Errno::Fault)?;
    coremap.with(|cm| copy_out(aspace, cm, buf_ptr, &kbuf[..n]))?;
    Ok(n)
}

/// `write(fd, buf, n) -> bytes`
pub fn sys_write(
    proc: &Process,
    coremap: &CoremapCell,
    fd: Fd,
    buf_ptr: VirtAddr,
    len: usize,
) -> Result<usize, Errno> {
    check_user_range(buf_ptr, len)?;
    let handle = proc.files.lock().get(fd)?;

    let mut kbuf = vec![0u8; len];
    {
        let dm = coremap.with(|cm| cm.dirmap());
        let aspace = proc.addr_space.lock();
        let aspace = aspace.as_ref().ok_or(Errno::Fault)?;
        copy_in(aspace, &dm, buf_ptr, &mut kbuf)?;
    }
    handle.write(&kbuf)
}

/// `close(fd)`
pub fn sys_close(proc: &Process, fd: Fd) -> Result<(), Errno> {
    proc.files.lock().remove(fd).map(|_| ())
}

/// `dup2(old, new) -> new`
pub fn sys_dup2(proc: &Process, old: Fd, new: Fd) -> Result<Fd, Errno> {
    proc.files.lock().dup2(old, new)
}

/// `lseek(fd, off, whence) -> newpos`
pub fn sys_lseek(proc: &Process, fd: Fd, pos: i64, whence: i32) -> Result<u64, Errno> {
    let handle = proc.files.lock().get(fd)?;
    handle.seek(pos, whence)
}

/// `chdir(path)`
pub fn sys_chdir(
    proc: &Process,
    vfs: &Vfs,
    coremap: &CoremapCell,
    path_ptr: VirtAddr,
) -> Result<(), Errno> {
    let path = path_from_user(proc, coremap, path_ptr)?;
    let vnode = vfs.resolve_dir(&path)?;
    *proc.cwd.lock() = Cwd { path, vnode };
    Ok(())
}

/// `__getcwd(buf, n) -> bytes`
///
/// Copies as much of the current directory path as fits; not
/// NUL-terminated, like the underlying syscall.
pub fn sys_getcwd(
    proc: &Process,
    coremap: &CoremapCell,
    buf_ptr: VirtAddr,
    len: usize,
) -> Result<usize, Errno> {
    if len == 0 {
        return Err(Errno::Inval);
    }
    check_user_range(buf_ptr, len)?;

    let path = proc.cwd.lock().path.clone();
    let bytes = path.as_bytes();
    let n = bytes.len().min(len);

    let mut aspace = proc.addr_space.lock();
    let aspace = aspace.as_mut().ok_or(Errno::Fault)?;
    coremap.with(|cm| copy_out(aspace, cm, buf_ptr, &bytes[..n]))?;
    Ok(n)
}

/// Wires file descriptors 0/1/2 to the console device.
pub fn std_io_init(proc: &Process, console: &Arc<Console>) -> Result<(), Errno> {
    let stdin: Arc<dyn crate::fs::Vnode> = console.clone();
    let mut files = proc.files.lock();
    files.insert_at(Fd::STDIN, FileHandle::new(stdin.clone(), OpenFlags::READ))?;
    files.insert_at(Fd::STDOUT, FileHandle::new(stdin.clone(), OpenFlags::WRITE))?;
    files.insert_at(Fd::STDERR, FileHandle::new(stdin, OpenFlags::WRITE))?;
    Ok(())
}
