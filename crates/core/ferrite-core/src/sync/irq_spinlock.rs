//! Interrupt-safe spin lock.
//!
//! Raises the interrupt priority level before acquiring the inner spin
//! lock and restores it on release. This prevents deadlocks when a lock
//! is shared between interrupt handlers and normal kernel code. All
//! blocking primitives guard their internal state with this lock.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::intr;

/// A spin lock that masks interrupts while held.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: Same reasoning as SpinLock — atomic ops ensure exclusive access.
unsafe impl<T: Send> Send for IrqSpinLock<T> {}
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Creates a new unlocked `IrqSpinLock`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name: "<unnamed>",
            data: UnsafeCell::new(value),
        }
    }

    /// Creates a new unlocked `IrqSpinLock` with a name for diagnostics.
    pub const fn named(name: &'static str, value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(value),
        }
    }

    /// Returns the diagnostic name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, raising the interrupt priority level first.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let saved_ipl = intr::raise();

        // TTAS spin to acquire.
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqSpinLockGuard {
                    lock: self,
                    saved_ipl,
                };
            }
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Attempts to acquire the lock without spinning.
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved_ipl = intr::raise();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqSpinLockGuard {
                lock: self,
                saved_ipl,
            })
        } else {
            // Failed — restore the interrupt priority level.
            intr::restore(saved_ipl);
            None
        }
    }
}

/// RAII guard that restores the interrupt priority level on drop.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    saved_ipl: u32,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        intr::restore(self.saved_ipl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_raises_ipl() {
        let lock = IrqSpinLock::new(1);
        assert!(!intr::raised());
        {
            let guard = lock.lock();
            assert!(intr::raised());
            assert_eq!(*guard, 1);
        }
        assert!(!intr::raised());
    }

    #[test]
    fn try_lock_restores_ipl_on_failure() {
        let lock = IrqSpinLock::new(());
        let _held = lock.lock();
        assert!(lock.try_lock().is_none());
        // One raise for the held guard only.
        drop(_held);
        assert!(!intr::raised());
    }

    #[test]
    fn nested_locks() {
        let a = IrqSpinLock::named("a", 1);
        let b = IrqSpinLock::named("b", 2);
        let ga = a.lock();
        let gb = b.lock();
        assert_eq!(*ga + *gb, 3);
        drop(gb);
        assert!(intr::raised());
        drop(ga);
        assert!(!intr::raised());
    }
}
