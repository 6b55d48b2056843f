//! Current-task tracking.
//!
//! The executor publishes the identity of the task it is polling so that
//! ownership-tracking primitives ([`Mutex`](crate::sync::Mutex)) can
//! answer "does the current thread hold this lock". Before the executor
//! starts, the current task is [`TaskId::BOOT`].
//!
//! This is per-CPU state. The kernel target has one CPU, so a single
//! atomic cell suffices; host tests treat each test thread as its own
//! CPU via a thread-local, so parallel tests cannot observe each other's
//! current task.

use crate::task::TaskId;

#[cfg(not(any(test, feature = "std")))]
mod cell {
    use core::sync::atomic::{AtomicU64, Ordering};

    use crate::task::TaskId;

    static CURRENT_TASK: AtomicU64 = AtomicU64::new(TaskId::BOOT.0);

    pub fn load() -> u64 {
        CURRENT_TASK.load(Ordering::Acquire)
    }

    pub fn store(val: u64) {
        CURRENT_TASK.store(val, Ordering::Release);
    }
}

#[cfg(any(test, feature = "std"))]
mod cell {
    use core::cell::Cell;

    use crate::task::TaskId;

    std::thread_local! {
        static CURRENT_TASK: Cell<u64> = const { Cell::new(TaskId::BOOT.0) };
    }

    pub fn load() -> u64 {
        CURRENT_TASK.with(Cell::get)
    }

    pub fn store(val: u64) {
        CURRENT_TASK.with(|c| c.set(val));
    }
}

/// Returns the identity of the currently executing task.
#[inline]
pub fn current_task() -> TaskId {
    TaskId(cell::load())
}

/// Publishes the currently executing task.
///
/// Called by the executor around each poll; everything else should treat
/// the current task as read-only.
pub fn set_current_task(id: TaskId) {
    cell::store(id.0);
}
