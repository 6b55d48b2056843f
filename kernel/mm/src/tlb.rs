//! Software-managed TLB model.
//!
//! Entries are `{hi, lo}` pairs: `hi` holds the virtual page number,
//! `lo` the physical page number plus [`EntryLo`] permission bits.
//! Replacement is random — the hardware picks the victim — and the
//! whole array is invalidated on address-space activation. Writes must
//! happen with interrupts masked; the global instance lives behind an
//! [`IrqSpinLock`] to enforce that.
//!
//! TLB shootdown is a multiprocessor affair; this is a uniprocessor
//! kernel and any shootdown request is fatal.

use bitflags::bitflags;
use ferrite_core::addr::PAGE_MASK;
use ferrite_core::sync::IrqSpinLock;

/// Number of TLB entries.
pub const TLB_ENTRIES: usize = 64;

bitflags! {
    /// Permission bits carried in a TLB entry's `lo` half.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryLo: u32 {
        /// Entry may be written through.
        const DIRTY = 1 << 10;
        /// Entry participates in translation.
        const VALID = 1 << 9;
    }
}

/// One translation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    /// Virtual page number half.
    pub hi: u32,
    /// Physical page number plus [`EntryLo`] bits.
    pub lo: u32,
}

/// Returns the per-slot invalid `hi` value.
///
/// Each slot gets a distinct kernel-segment address so invalid entries
/// can never alias each other or a user virtual page.
const fn invalid_hi(slot: usize) -> u32 {
    0x8000_0000 | ((slot as u32) << 12)
}

/// The translation lookaside buffer.
pub struct Tlb {
    entries: [TlbEntry; TLB_ENTRIES],
    /// State of the pseudo-random victim generator.
    lfsr: u32,
}

impl Tlb {
    /// Creates a TLB with every entry invalid.
    pub const fn new() -> Self {
        let mut entries = [TlbEntry { hi: 0, lo: 0 }; TLB_ENTRIES];
        let mut i = 0;
        while i < TLB_ENTRIES {
            entries[i] = TlbEntry {
                hi: invalid_hi(i),
                lo: 0,
            };
            i += 1;
        }
        Self {
            entries,
            lfsr: 0xace1,
        }
    }

    /// Writes an entry into a hardware-chosen (pseudo-random) slot.
    ///
    /// `hi` must be page-aligned.
    pub fn write_random(&mut self, hi: u32, lo: u32) {
        assert_eq!(
            u64::from(hi) & PAGE_MASK,
            0,
            "TLB hi must be a page address"
        );
        let slot = self.next_victim();
        self.entries[slot] = TlbEntry { hi, lo };
    }

    /// Invalidates every entry. Called on address-space activation.
    pub fn flush_all(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            *entry = TlbEntry {
                hi: invalid_hi(i),
                lo: 0,
            };
        }
    }

    /// Looks up the slot holding a valid translation for `hi`.
    pub fn probe(&self, hi: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.hi == hi && EntryLo::from_bits_truncate(e.lo).contains(EntryLo::VALID))
    }

    /// Reads the entry in `slot`.
    pub fn read(&self, slot: usize) -> TlbEntry {
        self.entries[slot]
    }

    /// Galois LFSR step; the low bits choose the victim slot.
    fn next_victim(&mut self) -> usize {
        let mut x = self.lfsr;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.lfsr = x;
        (x as usize) % TLB_ENTRIES
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles a TLB shootdown request for one mapping.
///
/// Never returns: there is exactly one CPU, so nobody should be asking.
pub fn shootdown() -> ! {
    panic!("tlb shootdown requested on a uniprocessor kernel");
}

/// Handles a request to shoot down the whole TLB. Fatal, as above.
pub fn shootdown_all() -> ! {
    panic!("tlb shootdown requested on a uniprocessor kernel");
}

/// Creates the CPU's TLB behind its interrupt-masking lock.
///
/// Taking the lock masks interrupts, which is what makes entry writes
/// atomic with respect to traps.
pub fn locked_tlb() -> IrqSpinLock<Tlb> {
    IrqSpinLock::named("tlb", Tlb::new())
}
