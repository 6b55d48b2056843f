//! Condition variable.
//!
//! Pairs with a caller-supplied [`Mutex`]: [`wait`](Condvar::wait)
//! releases the mutex around the sleep and re-acquires it before
//! returning. The waker is registered on the condvar's wait channel
//! (under the channel's own spin lock) *before* the mutex is released,
//! so a signaler that runs between the release and the sleep cannot lose
//! the wakeup. Callers must re-check their predicate in a loop (Mesa
//! semantics).

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use super::{Mutex, MutexGuard, MutexLockFuture, WaitChannel};

/// A condition variable.
///
/// ```ignore
/// // Waiter, with `m: Mutex<State>` and `cv: Condvar`:
/// let mut guard = m.lock().await;
/// while !guard.ready {
///     guard = cv.wait(guard).await;
/// }
///
/// // Signaler:
/// let mut guard = m.lock().await;
/// guard.ready = true;
/// cv.signal(&guard);
/// ```
pub struct Condvar {
    name: &'static str,
    wchan: WaitChannel,
}

impl Condvar {
    /// Creates a new condition variable.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            wchan: WaitChannel::new(name),
        }
    }

    /// Returns the diagnostic name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Atomically releases the guard's mutex, sleeps until signaled,
    /// then re-acquires the mutex and returns the new guard.
    pub fn wait<'a, T>(&'a self, guard: MutexGuard<'a, T>) -> CondvarWaitFuture<'a, T> {
        CondvarWaitFuture {
            condvar: self,
            mutex: guard.mutex_ref(),
            guard: Some(guard),
            relock: None,
        }
    }

    /// Wakes at most one waiter.
    ///
    /// The guard proves the associated mutex is held, so the woken task
    /// observes every state change made before the signal.
    pub fn signal<T>(&self, _guard: &MutexGuard<'_, T>) {
        self.wchan.wake_one();
    }

    /// Wakes every waiter.
    ///
    /// The guard proves the associated mutex is held.
    pub fn broadcast<T>(&self, _guard: &MutexGuard<'_, T>) {
        self.wchan.wake_all();
    }
}

/// Future returned by [`Condvar::wait`].
pub struct CondvarWaitFuture<'a, T> {
    condvar: &'a Condvar,
    mutex: &'a Mutex<T>,
    guard: Option<MutexGuard<'a, T>>,
    relock: Option<MutexLockFuture<'a, T>>,
}

impl<'a, T> Future for CondvarWaitFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(relock) = &mut this.relock {
            // Third phase: woken, re-acquiring the mutex.
            return Pin::new(relock).poll(cx);
        }

        if let Some(guard) = this.guard.take() {
            // First phase: register, then release. The registration
            // happens before the mutex release, so no signaler can slip
            // between the two.
            this.condvar.wchan.register(cx.waker());
            drop(guard);
            return Poll::Pending;
        }

        // Second phase: the wakeup arrived; start re-acquiring.
        let relock = this.relock.insert(this.mutex.lock());
        Pin::new(relock).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::counting_waker;
    use core::task::Waker;
    use std::sync::atomic::Ordering;

    #[test]
    fn signal_without_waiters_no_panic() {
        let m = Mutex::new("m", ());
        let cv = Condvar::new("cv");
        let guard = m.try_lock().unwrap();
        cv.signal(&guard);
        cv.broadcast(&guard);
    }

    #[test]
    fn wait_releases_mutex_and_pends() {
        let m = Mutex::new("m", false);
        let cv = Condvar::new("cv");
        let mut cx = Context::from_waker(Waker::noop());

        let guard = m.try_lock().unwrap();
        let mut fut = cv.wait(guard);
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        // The mutex was released by the first poll.
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn signal_after_release_is_not_lost() {
        // The adversarial interleaving: the signaler runs after wait()
        // released the mutex but before any further poll of the waiter.
        let m = Mutex::new("m", false);
        let cv = Condvar::new("cv");
        let (waker, wakes) = counting_waker();
        let mut cx = Context::from_waker(&waker);

        let guard = m.try_lock().unwrap();
        let mut fut = cv.wait(guard);
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        // Signaler: take the mutex, flip the flag, signal.
        {
            let mut g = m.try_lock().unwrap();
            *g = true;
            cv.signal(&g);
        }
        assert!(wakes.load(Ordering::SeqCst) > 0, "wakeup must not be lost");

        // The woken waiter re-acquires and observes the change.
        let Poll::Ready(guard) = Pin::new(&mut fut).poll(&mut cx) else {
            panic!("waiter should re-acquire the free mutex");
        };
        assert!(*guard, "state change made before signal must be visible");
    }

    #[test]
    fn broadcast_wakes_all_waiters() {
        let m = Mutex::new("m", ());
        let cv = Condvar::new("cv");

        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let mut cx1 = Context::from_waker(&w1);
        let mut cx2 = Context::from_waker(&w2);

        let mut f1 = cv.wait(m.try_lock().unwrap());
        assert!(matches!(Pin::new(&mut f1).poll(&mut cx1), Poll::Pending));
        let mut f2 = cv.wait(m.try_lock().unwrap());
        assert!(matches!(Pin::new(&mut f2).poll(&mut cx2), Poll::Pending));

        let guard = m.try_lock().unwrap();
        cv.broadcast(&guard);
        drop(guard);

        assert!(c1.load(Ordering::SeqCst) > 0);
        assert!(c2.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn signal_wakes_at_most_one() {
        let m = Mutex::new("m", ());
        let cv = Condvar::new("cv");

        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let mut cx1 = Context::from_waker(&w1);
        let mut cx2 = Context::from_waker(&w2);

        let mut f1 = cv.wait(m.try_lock().unwrap());
        assert!(matches!(Pin::new(&mut f1).poll(&mut cx1), Poll::Pending));
        let mut f2 = cv.wait(m.try_lock().unwrap());
        assert!(matches!(Pin::new(&mut f2).poll(&mut cx2), Poll::Pending));

        let guard = m.try_lock().unwrap();
        cv.signal(&guard);
        drop(guard);

        let woken = usize::from(c1.load(Ordering::SeqCst) > 0)
            + usize::from(c2.load(Ordering::SeqCst) > 0);
        assert_eq!(woken, 1, "signal wakes exactly one of the waiters");
    }
}
