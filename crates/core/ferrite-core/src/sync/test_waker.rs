//! Wake-counting waker for the sync tests.
//!
//! Built on `std::task::Wake`, the same mechanism the kernel executor
//! uses for its task wakers. Tests that only need a context to poll
//! with use `Waker::noop()` from std; this helper exists for the tests
//! that assert on whether (and how often) a primitive fired a wakeup.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Wake, Waker};

struct CountingWake {
    wakes: Arc<AtomicUsize>,
}

impl Wake for CountingWake {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Creates a [`Waker`] that counts how often it is woken, plus the
/// shared counter to assert on.
pub fn counting_waker() -> (Waker, Arc<AtomicUsize>) {
    let wakes = Arc::new(AtomicUsize::new(0));
    let waker = Waker::from(Arc::new(CountingWake {
        wakes: wakes.clone(),
    }));
    (waker, wakes)
}
