//! Reader-writer lock with writer preference.
//!
//! Any number of readers or a single writer. To keep a stream of readers
//! from starving writers, a queued writer blocks new readers once the
//! active readers match or exceed the queued writers; releases wake
//! every waiter and each re-checks the state (Mesa semantics).

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::task::{Context, Poll};

use super::{IrqSpinLock, WaitChannel};

/// Shared state, guarded by the lock's spin lock.
///
/// Invariants: `writing` implies `readers == 0`; `readers > 0` implies
/// `!writing`; `writers_queued` counts writers between their first
/// acquire poll and their release.
struct RwState {
    readers: u32,
    writers_queued: u32,
    writing: bool,
}

impl RwState {
    /// Whether a new reader may enter: no write in progress, and no
    /// queued writer that the current readership already crowds out.
    fn admits_reader(&self) -> bool {
        !self.writing && (self.writers_queued == 0 || self.readers < self.writers_queued)
    }

    /// Whether a queued writer may enter.
    fn admits_writer(&self) -> bool {
        self.readers == 0 && !self.writing
    }
}

/// A blocking reader-writer lock.
pub struct RwLock<T> {
    name: &'static str,
    state: IrqSpinLock<RwState>,
    wchan: WaitChannel,
    data: UnsafeCell<T>,
}

// SAFETY: The reader/writer protocol ensures `&T` is only shared while
// no writer is active and `&mut T` is exclusive.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new unlocked `RwLock` wrapping `value`.
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            state: IrqSpinLock::new(RwState {
                readers: 0,
                writers_queued: 0,
                writing: false,
            }),
            wchan: WaitChannel::new(name),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns the diagnostic name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock for shared reading.
    pub fn read(&self) -> RwLockReadFuture<'_, T> {
        RwLockReadFuture { rwlock: self }
    }

    /// Acquires the lock for exclusive writing.
    pub fn write(&self) -> RwLockWriteFuture<'_, T> {
        RwLockWriteFuture {
            rwlock: self,
            queued: false,
            acquired: false,
        }
    }

    /// Attempts a read acquisition without suspending.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.admits_reader() {
            state.readers += 1;
            Some(RwLockReadGuard { rwlock: self })
        } else {
            None
        }
    }

    /// Attempts a write acquisition without suspending.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.admits_writer() {
            state.writers_queued += 1;
            state.writing = true;
            Some(RwLockWriteGuard { rwlock: self })
        } else {
            None
        }
    }

    /// Returns the number of active readers.
    pub fn reader_count(&self) -> u32 {
        self.state.lock().readers
    }

    /// Returns `true` while a writer holds the lock.
    pub fn is_writing(&self) -> bool {
        self.state.lock().writing
    }
}

/// Future returned by [`RwLock::read`].
pub struct RwLockReadFuture<'a, T> {
    rwlock: &'a RwLock<T>,
}

impl<'a, T> Future for RwLockReadFuture<'a, T> {
    type Output = RwLockReadGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.rwlock.state.lock();
        if state.admits_reader() {
            state.readers += 1;
            Poll::Ready(RwLockReadGuard {
                rwlock: self.rwlock,
            })
        } else {
            self.rwlock.wchan.register(cx.waker());
            Poll::Pending
        }
    }
}

/// Future returned by [`RwLock::write`].
///
/// Counts itself as a queued writer on first poll so the writer
/// preference engages even while the writer is still parked; the count
/// drops again if the future is cancelled before acquiring.
pub struct RwLockWriteFuture<'a, T> {
    rwlock: &'a RwLock<T>,
    queued: bool,
    acquired: bool,
}

impl<'a, T> Future for RwLockWriteFuture<'a, T> {
    type Output = RwLockWriteGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.rwlock.state.lock();
        if !this.queued {
            this.queued = true;
            state.writers_queued += 1;
        }
        if state.admits_writer() {
            state.writing = true;
            this.acquired = true;
            Poll::Ready(RwLockWriteGuard {
                rwlock: this.rwlock,
            })
        } else {
            this.rwlock.wchan.register(cx.waker());
            Poll::Pending
        }
    }
}

impl<T> Drop for RwLockWriteFuture<'_, T> {
    fn drop(&mut self) {
        if self.queued && !self.acquired {
            // Cancelled while parked: stop blocking readers.
            {
                let mut state = self.rwlock.state.lock();
                state.writers_queued -= 1;
            }
            self.rwlock.wchan.wake_all();
        }
    }
}

/// RAII guard for shared read access.
pub struct RwLockReadGuard<'a, T> {
    rwlock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Readers only coexist with other readers.
        unsafe { &*self.rwlock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        {
            let mut state = self.rwlock.state.lock();
            debug_assert!(!state.writing, "reader active during write");
            state.readers -= 1;
        }
        // Wake everyone; parked writers and readers re-check the state.
        self.rwlock.wchan.wake_all();
    }
}

/// RAII guard for exclusive write access.
pub struct RwLockWriteGuard<'a, T> {
    rwlock: &'a RwLock<T>,
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The writer has exclusive access.
        unsafe { &*self.rwlock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The writer has exclusive access.
        unsafe { &mut *self.rwlock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        {
            let mut state = self.rwlock.state.lock();
            debug_assert!(state.writing, "write guard without writing state");
            debug_assert_eq!(state.readers, 0, "readers active during write");
            state.writing = false;
            state.writers_queued -= 1;
        }
        self.rwlock.wchan.wake_all();
    }
}
