//! Synchronization primitives for the kernel.
//!
//! Two layers. The bottom layer is busy-waiting: [`SpinLock`] and
//! [`IrqSpinLock`], usable in `static` items and before the executor is
//! available. The top layer blocks: [`Semaphore`], [`Mutex`],
//! [`Condvar`], and [`RwLock`] are all built from a spin lock plus a
//! [`WaitChannel`] and suspend the calling task instead of spinning.
//!
//! Blocking primitives use Mesa semantics: a woken task re-checks its
//! predicate under the primitive's spin lock before proceeding, so a
//! wakeup is a hint, never a transfer of ownership. The no-lost-wakeup
//! guarantee comes from registering the waker while the primitive's
//! spin lock is still held.

mod condvar;
mod irq_spinlock;
mod mutex;
mod rwlock;
mod semaphore;
mod spinlock;
mod wait_channel;

#[cfg(test)]
pub(crate) mod test_waker;

pub use condvar::{Condvar, CondvarWaitFuture};
pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use mutex::{Mutex, MutexGuard, MutexLockFuture};
pub use rwlock::{RwLock, RwLockReadFuture, RwLockReadGuard, RwLockWriteFuture, RwLockWriteGuard};
pub use semaphore::{Semaphore, SemaphoreAcquireFuture};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use wait_channel::WaitChannel;
