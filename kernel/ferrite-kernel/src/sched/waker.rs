//! Waker implementation for kernel tasks.
//!
//! A task's waker carries the executor's ready queue and the task id;
//! waking pushes the id back onto the queue. Wakers stay valid after
//! the task completes — a late wake enqueues an id the executor no
//! longer knows, which is dropped harmlessly.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::task::Wake;
use core::task::Waker;

use ferrite_core::sync::IrqSpinLock;
use ferrite_core::task::TaskId;

/// The executor's queue of runnable task ids.
pub(crate) type ReadyQueue = IrqSpinLock<VecDeque<TaskId>>;

pub(crate) struct TaskWaker {
    queue: Arc<ReadyQueue>,
    id: TaskId,
}

impl TaskWaker {
    /// Builds a waker that re-queues `id` on `queue`.
    pub(crate) fn waker(queue: Arc<ReadyQueue>, id: TaskId) -> Waker {
        Waker::from(Arc::new(Self { queue, id }))
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.lock().push_back(self.id);
    }
}
