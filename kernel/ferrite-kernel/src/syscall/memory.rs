//! Memory syscall handlers.

use ferrite_core::addr::VirtAddr;
use ferrite_core::syscall::Errno;

use crate::proc::Process;

/// `sbrk(delta) -> old_break`
///
/// All the work happens in the address space under its serializing
/// lock; new heap pages are recorded lazily and materialize on first
/// fault.
pub fn sys_sbrk(proc: &Process, delta: isize) -> Result<VirtAddr, Errno> {
    let mut aspace = proc.addr_space.lock();
    let aspace = aspace.as_mut().ok_or(Errno::Fault)?;
    aspace.sbrk(delta as i64)
}
