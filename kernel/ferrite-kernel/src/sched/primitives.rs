//! Scheduling primitives.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// Yields the current task once, letting every other ready task run
/// before this one is polled again.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            // Re-queue immediately; the executor round-robins the rest
            // of the ready queue first.
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
