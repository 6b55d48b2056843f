//! Wait channel: a named queue of parked tasks.
//!
//! Every blocking primitive owns a `WaitChannel` and parks waiters on it
//! by registering their [`Waker`] and returning `Poll::Pending`. The
//! atomic sleep-and-release contract is by construction: a primitive
//! registers the waker while its own spin lock is still held, and every
//! waker on the wake side runs after the state mutation under that same
//! lock, so a wakeup issued after the waiter's predicate check cannot be
//! lost.

extern crate alloc;

use alloc::collections::VecDeque;
use core::task::Waker;

use super::IrqSpinLock;

/// A queue of [`Waker`]s parked on an event.
pub struct WaitChannel {
    name: &'static str,
    waiters: IrqSpinLock<VecDeque<Waker>>,
}

impl WaitChannel {
    /// Creates an empty wait channel.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            waiters: IrqSpinLock::new(VecDeque::new()),
        }
    }

    /// Returns the diagnostic name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Parks the calling task: queues its waker for a later wake.
    ///
    /// Contract: the caller holds the owning primitive's spin lock and
    /// returns `Poll::Pending` immediately after, re-checking its
    /// predicate on the next poll (Mesa semantics).
    pub fn register(&self, waker: &Waker) {
        self.waiters.lock().push_back(waker.clone());
    }

    /// Wakes one parked task (FIFO order). No-op when empty.
    pub fn wake_one(&self) {
        let waker = self.waiters.lock().pop_front();
        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Wakes every parked task.
    pub fn wake_all(&self) {
        let drained: VecDeque<Waker> = {
            let mut waiters = self.waiters.lock();
            core::mem::take(&mut *waiters)
        };
        for w in drained {
            w.wake();
        }
    }

    /// Returns the number of parked wakers.
    ///
    /// A task that was woken but has not re-polled yet is not counted,
    /// so this is a lower bound on logical waiters.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::counting_waker;
    use core::task::Waker;
    use std::sync::atomic::Ordering;

    #[test]
    fn wake_one_empty_no_panic() {
        let wc = WaitChannel::new("empty");
        wc.wake_one();
    }

    #[test]
    fn wake_all_empty_no_panic() {
        let wc = WaitChannel::new("empty");
        wc.wake_all();
    }

    #[test]
    fn wake_one_fifo() {
        let wc = WaitChannel::new("fifo");
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        wc.register(&w1);
        wc.register(&w2);

        wc.wake_one();
        assert!(c1.load(Ordering::SeqCst) > 0, "first waker should be woken");
        assert_eq!(
            c2.load(Ordering::SeqCst),
            0,
            "second waker should not be woken"
        );

        wc.wake_one();
        assert!(c2.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn wake_all_wakes_everyone() {
        let wc = WaitChannel::new("all");
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let (w3, c3) = counting_waker();
        wc.register(&w1);
        wc.register(&w2);
        wc.register(&w3);

        wc.wake_all();
        assert!(c1.load(Ordering::SeqCst) > 0);
        assert!(c2.load(Ordering::SeqCst) > 0);
        assert!(c3.load(Ordering::SeqCst) > 0);
        assert_eq!(wc.waiter_count(), 0);
    }

    #[test]
    fn waiter_count_tracks_registrations() {
        let wc = WaitChannel::new("count");
        assert_eq!(wc.waiter_count(), 0);
        let waker = Waker::noop();
        wc.register(waker);
        wc.register(waker);
        assert_eq!(wc.waiter_count(), 2);
        wc.wake_one();
        assert_eq!(wc.waiter_count(), 1);
    }
}
