//! Memory management for the ferrite kernel.
//!
//! Three pieces: the [`coremap`] physical-frame allocator, per-process
//! [`address_space`]s with demand paging, and the software-managed
//! [`tlb`] they drive. The [`fault`] module ties them together in the
//! VM fault handler.
//!
//! Physical memory is reached through the kernel's direct-map window
//! ([`layout::DirectMap`]); the window's offset is a boot parameter, so
//! host tests can stand in a plain allocation as "RAM".

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod address_space;
pub mod coremap;
pub mod fault;
pub mod layout;
pub mod tlb;

pub use address_space::{AddressSpace, Region, RegionPerms};
pub use coremap::{Coremap, CoremapCell};
pub use fault::{FaultKind, is_legal_user_address, vm_fault};
pub use layout::DirectMap;
pub use tlb::Tlb;
