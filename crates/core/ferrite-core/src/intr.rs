//! Interrupt-state tracking for a single CPU.
//!
//! The kernel raises the interrupt priority level around critical
//! sections ([`IrqSpinLock`](crate::sync::IrqSpinLock) critical sections
//! and TLB writes) and marks trap entry/exit so blocking primitives can
//! assert they are not used from interrupt context. On real hardware the
//! raise/restore pair is where the status-register twiddle goes; the
//! portable implementation tracks a depth counter, which is exact on a
//! uniprocessor.
//!
//! Like [`sched`](crate::sched), this is per-CPU state: one set of
//! counters on the kernel target, a thread-local per test thread on the
//! host.

#[cfg(not(any(test, feature = "std")))]
mod state {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    static SPL_DEPTH: AtomicU32 = AtomicU32::new(0);
    static IN_INTERRUPT: AtomicBool = AtomicBool::new(false);

    pub fn depth_add(delta: i32) -> u32 {
        if delta > 0 {
            SPL_DEPTH.fetch_add(delta as u32, Ordering::Acquire)
        } else {
            SPL_DEPTH.fetch_sub(delta.unsigned_abs(), Ordering::Release)
        }
    }

    pub fn depth() -> u32 {
        SPL_DEPTH.load(Ordering::Acquire)
    }

    pub fn set_interrupt(active: bool) {
        IN_INTERRUPT.store(active, Ordering::Release);
    }

    pub fn interrupt() -> bool {
        IN_INTERRUPT.load(Ordering::Acquire)
    }
}

#[cfg(any(test, feature = "std"))]
mod state {
    use core::cell::Cell;

    std::thread_local! {
        static SPL_DEPTH: Cell<u32> = const { Cell::new(0) };
        static IN_INTERRUPT: Cell<bool> = const { Cell::new(false) };
    }

    pub fn depth_add(delta: i32) -> u32 {
        SPL_DEPTH.with(|d| {
            let old = d.get();
            d.set(old.wrapping_add_signed(delta));
            old
        })
    }

    pub fn depth() -> u32 {
        SPL_DEPTH.with(Cell::get)
    }

    pub fn set_interrupt(active: bool) {
        IN_INTERRUPT.with(|c| c.set(active));
    }

    pub fn interrupt() -> bool {
        IN_INTERRUPT.with(Cell::get)
    }
}

/// Raises the interrupt priority level and returns the previous depth.
///
/// Pair every call with [`restore`].
#[inline]
pub fn raise() -> u32 {
    state::depth_add(1)
}

/// Restores the interrupt priority level saved by [`raise`].
#[inline]
pub fn restore(_prev: u32) {
    let old = state::depth_add(-1);
    debug_assert!(old > 0, "interrupt priority restore without raise");
}

/// Returns `true` while any raised-IPL section is active.
#[inline]
pub fn raised() -> bool {
    state::depth() > 0
}

/// Marks entry to or exit from an interrupt handler.
///
/// Called by the trap layer; blocking primitives consult
/// [`in_interrupt`] to reject sleeps from interrupt context.
pub fn set_in_interrupt(active: bool) {
    state::set_interrupt(active);
}

/// Returns `true` while the CPU is servicing an interrupt.
#[inline]
pub fn in_interrupt() -> bool {
    state::interrupt()
}
