//! Async executor for kernel tasks.
//!
//! A cooperative, single-CPU executor. Tasks are heap-allocated, pinned,
//! dynamically dispatched futures; a waker-based ready queue ensures
//! only runnable tasks are polled. The future is taken out of storage
//! before polling so no executor lock is held while task code runs, and
//! the identity of the polled task is published through
//! [`ferrite_core::sched`] for the ownership-tracking primitives.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::{Context, Poll};

use ferrite_core::sched;
use ferrite_core::sync::{IrqSpinLock, SpinLock};
use ferrite_core::task::{TaskId, TaskMeta};

use super::waker::{ReadyQueue, TaskWaker};

/// A pinned, heap-allocated, dynamically dispatched future.
type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A stored task: its future plus metadata.
struct TaskEntry {
    future: TaskFuture,
    #[allow(dead_code, reason = "surfaced in task dumps and debugging")]
    meta: TaskMeta,
}

/// The kernel's async task executor.
pub struct Executor {
    /// Task storage: id -> entry. An entry is absent while its future
    /// is out being polled.
    tasks: IrqSpinLock<BTreeMap<TaskId, TaskEntry>>,
    /// Runnable task ids, FIFO.
    ready: Arc<ReadyQueue>,
    /// Next task id.
    next_id: AtomicU64,
}

impl Executor {
    /// Creates an executor with no tasks.
    pub fn new() -> Self {
        Self {
            tasks: IrqSpinLock::named("executor.tasks", BTreeMap::new()),
            ready: Arc::new(IrqSpinLock::named("executor.ready", VecDeque::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawns a task with default metadata.
    pub fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) -> TaskId {
        self.spawn_with_meta(future, TaskMeta::default())
    }

    /// Spawns a task with a debugging name.
    pub fn spawn_named(
        &self,
        name: &'static str,
        future: impl Future<Output = ()> + Send + 'static,
    ) -> TaskId {
        self.spawn_with_meta(future, TaskMeta::new(name))
    }

    /// Spawns a task with explicit metadata.
    pub fn spawn_with_meta(
        &self,
        future: impl Future<Output = ()> + Send + 'static,
        meta: TaskMeta,
    ) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks.lock().insert(
            id,
            TaskEntry {
                future: Box::pin(future),
                meta,
            },
        );
        self.ready.lock().push_back(id);
        id
    }

    /// Returns the number of live (incomplete) tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Polls every ready task until the ready queue drains.
    ///
    /// A task that yields or is woken during the sweep runs again in
    /// the same call; the sweep ends only when nothing is runnable.
    pub fn run_until_idle(&self) {
        loop {
            let id = self.ready.lock().pop_front();
            match id {
                Some(id) => self.poll_task(id),
                None => break,
            }
        }
    }

    /// Runs the executor until `future` completes, then returns its
    /// output. Spawned tasks keep running interleaved with it.
    ///
    /// # Panics
    ///
    /// Panics when every task is blocked and nothing can wake them —
    /// on this uniprocessor build that is a genuine deadlock.
    pub fn block_on<T: Send + 'static>(
        &self,
        future: impl Future<Output = T> + Send + 'static,
    ) -> T {
        let result = Arc::new(SpinLock::new(None));
        let slot = result.clone();
        self.spawn_named("block_on", async move {
            *slot.lock() = Some(future.await);
        });

        loop {
            self.run_until_idle();
            if let Some(val) = result.lock().take() {
                return val;
            }
            // Ready queue drained without the root future finishing:
            // every remaining task is parked with nobody left to wake it.
            panic!("executor: all tasks blocked (deadlock)");
        }
    }

    /// Polls one task, publishing it as the current task.
    fn poll_task(&self, id: TaskId) {
        let waker = TaskWaker::waker(self.ready.clone(), id);
        let mut cx = Context::from_waker(&waker);

        // Take the future out of storage so no lock is held while task
        // code runs. A stale ready-queue entry finds nothing and is
        // dropped.
        let entry = self.tasks.lock().remove(&id);
        let Some(mut entry) = entry else { return };

        let prev = sched::current_task();
        sched::set_current_task(id);
        let res = entry.future.as_mut().poll(&mut cx);
        sched::set_current_task(prev);

        if res.is_pending() {
            self.tasks.lock().insert(id, entry);
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
