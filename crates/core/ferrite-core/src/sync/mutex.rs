//! Blocking mutual exclusion lock with owner tracking.
//!
//! Unlike [`SpinLock`](super::SpinLock), a contended [`Mutex`] suspends
//! the calling task on the mutex's wait channel. The owner is recorded
//! so the lock can answer [`do_i_hold`](Mutex::do_i_hold); acquisition
//! is non-recursive and re-acquisition by the owner is a programmer
//! error caught by an assertion.

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::task::{Context, Poll};

use super::{IrqSpinLock, WaitChannel};
use crate::sched;
use crate::task::TaskId;

/// A blocking, owner-tracked, non-recursive mutual exclusion lock.
pub struct Mutex<T> {
    name: &'static str,
    owner: IrqSpinLock<Option<TaskId>>,
    wchan: WaitChannel,
    data: UnsafeCell<T>,
}

// SAFETY: The owner protocol ensures exclusive access to `T`.
// `T: Send` is required because the data moves between tasks.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked `Mutex` wrapping `value`.
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            owner: IrqSpinLock::new(None),
            wchan: WaitChannel::new(name),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns the diagnostic name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, suspending the task while it is held.
    ///
    /// Asserts that the current task does not already hold the lock.
    pub fn lock(&self) -> MutexLockFuture<'_, T> {
        MutexLockFuture { mutex: self }
    }

    /// Attempts to acquire the lock without suspending.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut owner = self.owner.lock();
        if owner.is_none() {
            *owner = Some(sched::current_task());
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Returns `true` if the current task holds the lock.
    pub fn do_i_hold(&self) -> bool {
        *self.owner.lock() == Some(sched::current_task())
    }

    fn release(&self) {
        let mut owner = self.owner.lock();
        assert_eq!(
            *owner,
            Some(sched::current_task()),
            "mutex {}: released by non-owner",
            self.name
        );
        // Wake one waiter before clearing the owner, while the spin lock
        // still serializes: the woken task re-checks the owner in its
        // acquire loop.
        self.wchan.wake_one();
        *owner = None;
    }
}

/// Future returned by [`Mutex::lock`].
pub struct MutexLockFuture<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Future for MutexLockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let current = sched::current_task();
        let mut owner = self.mutex.owner.lock();
        match *owner {
            None => {
                *owner = Some(current);
                Poll::Ready(MutexGuard { mutex: self.mutex })
            }
            Some(holder) => {
                assert_ne!(
                    holder, current,
                    "mutex {}: recursive acquire",
                    self.mutex.name
                );
                // Registered while the owner lock is held, so a release
                // that runs after this check will find the waker.
                self.mutex.wchan.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

/// RAII guard that releases the [`Mutex`] when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Returns a reference to the underlying [`Mutex`].
    ///
    /// Used by [`Condvar::wait`](super::Condvar::wait) to re-acquire
    /// after the sleep.
    pub fn mutex_ref(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
