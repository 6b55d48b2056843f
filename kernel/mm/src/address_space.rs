//! Per-process virtual address spaces.
//!
//! An address space is an ordered list of defined [`Region`]s, a heap
//! window planted immediately after the last region, and a page map
//! from virtual page number to backing frame. Pages are backed lazily:
//! a map entry of `None` (created by `sbrk`) or a missing entry (heap
//! and stack pages never touched) gains a zeroed frame on first fault.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use bitflags::bitflags;
use ferrite_core::addr::{PAGE_MASK, PAGE_SIZE, PhysAddr, VirtAddr};
use ferrite_core::sync::IrqSpinLock;
use ferrite_core::syscall::Errno;

use crate::coremap::Coremap;
use crate::layout::USER_STACK_TOP;
use crate::tlb::Tlb;

bitflags! {
    /// Region permission bits.
    ///
    /// Accepted and recorded, but not enforced by the hardware mapping:
    /// every installed TLB entry is writable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionPerms: u8 {
        /// Readable.
        const READ = 1 << 0;
        /// Writable.
        const WRITE = 1 << 1;
        /// Executable.
        const EXEC = 1 << 2;
    }
}

/// A defined virtual-memory region (code or data segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Page-aligned base address.
    pub start: VirtAddr,
    /// Size in bytes, a multiple of the page size.
    pub size: u64,
    /// Declared permissions (unenforced).
    pub perms: RegionPerms,
}

impl Region {
    /// Returns `true` if `addr` falls inside the region.
    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.start && addr < self.start + self.size
    }
}

/// A per-process address space.
pub struct AddressSpace {
    /// Defined regions, in definition order.
    regions: Vec<Region>,
    /// First byte of the heap; planted after the last defined region.
    heap_start: VirtAddr,
    /// First byte past the heap. Always `>= heap_start`, page-aligned.
    heap_end: VirtAddr,
    /// Virtual page -> backing frame. `None` is a lazy page from `sbrk`
    /// that has not been touched yet.
    pages: BTreeMap<VirtAddr, Option<PhysAddr>>,
}

impl AddressSpace {
    /// Creates an empty address space.
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            heap_start: VirtAddr::zero(),
            heap_end: VirtAddr::zero(),
            pages: BTreeMap::new(),
        }
    }

    /// Defines a region at `vaddr` of `size` bytes.
    ///
    /// The base is aligned down and the length up to page granularity.
    /// The heap window is re-planted immediately after this region, so
    /// the last definition decides where the heap lives.
    pub fn define_region(&mut self, vaddr: VirtAddr, size: u64, perms: RegionPerms) {
        // Align the region. First the base, widening the length by the
        // cut-off part, then the length.
        let base = vaddr.align_down(PAGE_SIZE as u64);
        let size = size + vaddr.page_offset();
        let size = (size + PAGE_MASK) & !PAGE_MASK;

        let region = Region {
            start: base,
            size,
            perms,
        };
        self.regions.push(region);

        self.heap_start = base + size;
        self.heap_end = self.heap_start;
    }

    /// Returns the top-of-stack address for a fresh user stack.
    pub fn define_stack(&self) -> VirtAddr {
        USER_STACK_TOP
    }

    /// Hook called before loading an executable into the space.
    ///
    /// Permission tightening would go here in a full VM; nothing to do.
    pub fn prepare_load(&mut self) {}

    /// Hook called after loading completes. Nothing to do.
    pub fn complete_load(&mut self) {}

    /// Returns the defined regions in definition order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Returns the first byte of the heap window.
    pub fn heap_start(&self) -> VirtAddr {
        self.heap_start
    }

    /// Returns the first byte past the heap window.
    pub fn heap_end(&self) -> VirtAddr {
        self.heap_end
    }

    /// Looks up the backing frame recorded for a virtual page.
    ///
    /// `Some(None)` is a lazy page that has no frame yet.
    pub fn lookup_page(&self, vpn: VirtAddr) -> Option<Option<PhysAddr>> {
        debug_assert!(vpn.is_aligned(PAGE_SIZE as u64));
        self.pages.get(&vpn).copied()
    }

    /// Returns the page map in ascending virtual-address order.
    pub fn pages(&self) -> impl Iterator<Item = (VirtAddr, Option<PhysAddr>)> + '_ {
        self.pages.iter().map(|(v, p)| (*v, *p))
    }

    /// Returns the backing frame for `vpn`, allocating and zeroing one
    /// if the page is lazy or unmapped.
    ///
    /// Legality of the address is the caller's concern; this only backs
    /// the page.
    pub fn ensure_backed(&mut self, vpn: VirtAddr, coremap: &mut Coremap) -> Result<PhysAddr, Errno> {
        debug_assert!(vpn.is_aligned(PAGE_SIZE as u64));
        if let Some(Some(pa)) = self.pages.get(&vpn) {
            return Ok(*pa);
        }
        let pa = coremap.alloc_zeroed(1)?;
        self.pages.insert(vpn, Some(pa));
        Ok(pa)
    }

    /// Grows (or shrinks) the heap by `delta` bytes, page-aligned up.
    ///
    /// Returns the old break. Growth appends one lazy page record per
    /// new heap page; frames arrive on first fault. A move below the
    /// heap base is refused. Shrinking adjusts the break only; any
    /// frames past it stay allocated until the space is destroyed.
    pub fn sbrk(&mut self, delta: i64) -> Result<VirtAddr, Errno> {
        let old_break = self.heap_end;

        let target = self.heap_end.as_u64() as i64 + delta;
        if target < self.heap_start.as_u64() as i64 {
            return Err(Errno::Inval);
        }

        // Align the signed delta upward to whole pages.
        let aligned = delta.div_euclid(PAGE_SIZE as i64) * PAGE_SIZE as i64
            + i64::from(delta.rem_euclid(PAGE_SIZE as i64) > 0) * PAGE_SIZE as i64;

        if aligned > 0 {
            let npages = aligned as u64 / PAGE_SIZE as u64;
            for i in 0..npages {
                let vpn = old_break + i * PAGE_SIZE as u64;
                // A page surviving an earlier shrink keeps its frame.
                self.pages.entry(vpn).or_insert(None);
            }
            self.heap_end = old_break + aligned as u64;
        } else {
            self.heap_end = VirtAddr::new((self.heap_end.as_u64() as i64 + aligned) as u64);
        }

        Ok(old_break)
    }

    /// Deep-copies the address space.
    ///
    /// Regions and heap bounds are copied verbatim. Every backed page
    /// gets a fresh zeroed frame with the source bytes copied in; lazy
    /// pages stay lazy. Iteration order in the copy matches the source.
    pub fn copy(&self, coremap: &mut Coremap) -> Result<Self, Errno> {
        let mut target = Self::new();
        target.regions = self.regions.clone();
        target.heap_start = self.heap_start;
        target.heap_end = self.heap_end;

        for (vpn, backing) in &self.pages {
            match backing {
                None => {
                    target.pages.insert(*vpn, None);
                }
                Some(src) => match coremap.alloc_zeroed(1) {
                    Ok(dst) => {
                        coremap.dirmap().copy_frame(dst, *src);
                        target.pages.insert(*vpn, Some(dst));
                    }
                    Err(e) => {
                        // Unwind the frames copied so far.
                        target.destroy(coremap);
                        return Err(e);
                    }
                },
            }
        }

        Ok(target)
    }

    /// Tears the address space down, returning every backing frame.
    pub fn destroy(self, coremap: &mut Coremap) {
        for (_vpn, backing) in self.pages {
            if let Some(pa) = backing {
                coremap.free_frames(pa);
            }
        }
    }

    /// Makes this address space current on the CPU by invalidating the
    /// entire TLB. Called on context switch.
    pub fn activate(&self, tlb: &IrqSpinLock<Tlb>) {
        tlb.lock().flush_all();
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
