//! VM fault handling.
//!
//! Entered from the trap handler on a TLB miss. Decides whether the
//! faulting address is legal (a defined region, the heap window, or the
//! user stack window), backs the page with a zeroed frame on first
//! touch, and installs the translation into a random TLB slot.

use ferrite_core::addr::VirtAddr;
use ferrite_core::sync::IrqSpinLock;
use ferrite_core::syscall::Errno;

use crate::address_space::AddressSpace;
use crate::coremap::Coremap;
use crate::layout::{USER_STACK_TOP, stack_window_base};
use crate::tlb::{EntryLo, Tlb};

/// Kind of memory fault, as reported by the trap handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Read miss.
    Read,
    /// Write miss.
    Write,
    /// Write to a present read-only translation.
    ReadOnly,
}

impl FaultKind {
    /// Decodes the raw trap code. Unknown codes are a user error.
    pub fn from_code(code: u32) -> Result<Self, Errno> {
        match code {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadOnly),
            _ => Err(Errno::Inval),
        }
    }
}

/// Returns `true` when `vaddr` is an address user code may touch: a
/// defined region, the heap window, or the stack window below the
/// stack top. Used by the fault handler and by kernel copies into user
/// space.
pub fn is_legal_user_address(aspace: &AddressSpace, vaddr: VirtAddr) -> bool {
    let vaddr = vaddr.page_base();

    // Between the heap and the stack window lies nothing.
    if vaddr >= aspace.heap_end() && vaddr < stack_window_base() {
        return false;
    }

    if vaddr >= USER_STACK_TOP {
        return false;
    }

    // Below the heap, the address must fall inside a defined region.
    if vaddr < aspace.heap_start() && !aspace.regions().iter().any(|r| r.contains(vaddr)) {
        return false;
    }

    true
}

/// Handles a VM fault against `aspace`.
///
/// On success a translation for the faulting page is live in the TLB.
/// Illegal addresses return bad-address; out-of-frames returns
/// no-memory.
///
/// # Panics
///
/// A READONLY fault panics: every mapping this kernel installs is
/// writable, so the hardware cannot legitimately report one.
pub fn vm_fault(
    aspace: &mut AddressSpace,
    coremap: &mut Coremap,
    tlb: &IrqSpinLock<Tlb>,
    kind: FaultKind,
    faultaddress: VirtAddr,
) -> Result<(), Errno> {
    let faultaddress = faultaddress.page_base();

    match kind {
        FaultKind::ReadOnly => {
            // We always create pages read-write, so we can't get this.
            panic!("vm_fault: READONLY fault at {faultaddress}");
        }
        FaultKind::Read | FaultKind::Write => {}
    }

    if !is_legal_user_address(aspace, faultaddress) {
        return Err(Errno::Fault);
    }

    let paddr = aspace.ensure_backed(faultaddress, coremap)?;
    assert!(paddr.is_page_aligned(), "backing frame must be page-aligned");

    // Install under raised interrupt priority (the TLB lock masks
    // interrupts) so the write is atomic with respect to traps.
    let hi = faultaddress.as_u64() as u32;
    let lo = paddr.as_u64() as u32 | (EntryLo::DIRTY | EntryLo::VALID).bits();
    tlb.lock().write_random(hi, lo);

    Ok(())
}
