//! Core types and synchronization primitives for the ferrite kernel.
//!
//! This crate contains the host-testable foundations of the kernel:
//! address and identifier newtypes, interrupt-state tracking, logging,
//! the syscall ABI (numbers, errnos, wait-status encoding), and all
//! synchronization primitives (spin locks, wait channels, semaphores,
//! mutexes, condition variables, and reader-writer locks).
//!
//! By living outside the kernel crate, these types can be tested with
//! `cargo test` on the host without a kernel target.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod addr;
pub mod id;
pub mod intr;
pub mod log;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod task;
