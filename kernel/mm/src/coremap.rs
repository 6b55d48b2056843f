//! Coremap: the physical-frame allocator.
//!
//! A dense array with one entry per frame of RAM, stored at the bottom
//! of RAM itself and reached through the direct-map window. Allocation
//! is first-fit over runs of free frames; the run length is remembered
//! in the first frame's entry so freeing needs only the base address.
//! Frames are either `Free` or `Fixed` (kernel-owned / user-backing);
//! there is no coalescing because adjacency is rediscovered by the next
//! scan.

use ferrite_core::addr::{PAGE_SIZE, PhysAddr};
use ferrite_core::sync::SpinLock;
use ferrite_core::syscall::Errno;

use crate::layout::DirectMap;

/// Allocation state of one physical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameState {
    /// Available for allocation.
    Free,
    /// Allocated; owned by the kernel or backing a user page.
    Fixed,
}

/// Per-frame bookkeeping.
///
/// Only the first frame of an allocated chunk carries a nonzero
/// `chunk_size`; the remaining frames of the chunk are `Fixed` with
/// `chunk_size == 0`.
#[derive(Debug, Clone, Copy)]
struct FrameInfo {
    state: FrameState,
    chunk_size: u32,
}

/// The physical-frame allocator.
pub struct Coremap {
    frames: &'static mut [FrameInfo],
    /// First frame past the coremap's own storage; scans start here.
    base_frame: usize,
    dirmap: DirectMap,
}

impl Coremap {
    /// Builds the coremap over `total_frames` frames of RAM, placing its
    /// own storage in the leading frames.
    ///
    /// # Safety
    ///
    /// `dirmap` must cover physical addresses `[0, total_frames *
    /// PAGE_SIZE)`, and that memory must not be in use. Call once per
    /// region of RAM.
    pub unsafe fn new(total_frames: usize, dirmap: DirectMap) -> Self {
        let meta_bytes = total_frames * core::mem::size_of::<FrameInfo>();
        let meta_frames = meta_bytes.div_ceil(PAGE_SIZE);
        assert!(meta_frames < total_frames, "RAM too small for its coremap");

        // SAFETY: The dirmap covers the metadata range, which the safety
        // contract says is otherwise unused.
        let frames = unsafe {
            core::slice::from_raw_parts_mut(
                dirmap.ptr(PhysAddr::zero()).cast::<FrameInfo>(),
                total_frames,
            )
        };
        for entry in frames.iter_mut() {
            *entry = FrameInfo {
                state: FrameState::Free,
                chunk_size: 0,
            };
        }

        Self {
            frames,
            base_frame: meta_frames,
            dirmap,
        }
    }

    /// Returns the direct-map window over the managed RAM.
    pub fn dirmap(&self) -> DirectMap {
        self.dirmap
    }

    /// Returns the number of managed frames (including the coremap's own).
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the index of the first allocatable frame.
    pub fn base_frame(&self) -> usize {
        self.base_frame
    }

    /// Allocates `npages` physically contiguous frames.
    ///
    /// First-fit scan from the base frame. Returns the physical address
    /// of the first frame, or no-memory when no run is long enough.
    pub fn alloc_frames(&mut self, npages: usize) -> Result<PhysAddr, Errno> {
        assert!(npages > 0, "zero-length frame allocation");

        let mut run = 0usize;
        let mut i = self.base_frame;
        while i < self.frames.len() {
            if self.frames[i].state == FrameState::Free {
                run += 1;
                if run == npages {
                    let start = i + 1 - npages;
                    for entry in &mut self.frames[start..=i] {
                        entry.state = FrameState::Fixed;
                        entry.chunk_size = 0;
                    }
                    self.frames[start].chunk_size = npages as u32;
                    return Ok(PhysAddr::new((start * PAGE_SIZE) as u64));
                }
            } else {
                run = 0;
            }
            i += 1;
        }
        Err(Errno::NoMem)
    }

    /// Allocates `npages` contiguous frames and zeroes them.
    pub fn alloc_zeroed(&mut self, npages: usize) -> Result<PhysAddr, Errno> {
        let pa = self.alloc_frames(npages)?;
        for i in 0..npages {
            self.dirmap.zero_frame(pa + (i * PAGE_SIZE) as u64);
        }
        Ok(pa)
    }

    /// Allocates `npages` contiguous zeroed frames and returns the
    /// kernel direct-mapped address of the first, for kernel-internal
    /// buffers.
    pub fn alloc_kpages(&mut self, npages: usize) -> Result<*mut u8, Errno> {
        let pa = self.alloc_zeroed(npages)?;
        Ok(self.dirmap.ptr(pa))
    }

    /// Frees a chunk by the kernel virtual address [`alloc_kpages`]
    /// returned, stripping the direct-map offset to recover the frame.
    ///
    /// [`alloc_kpages`]: Coremap::alloc_kpages
    pub fn free_kpages(&mut self, kvaddr: *mut u8) {
        let pa = PhysAddr::new(kvaddr as u64 - self.dirmap.offset());
        self.free_frames(pa);
    }

    /// Frees the chunk whose first frame is at `pa`.
    ///
    /// The chunk length was remembered at allocation time. Freeing a
    /// base whose length is already cleared is a no-op, so a double
    /// free is tolerated rather than corrupting neighbouring chunks.
    pub fn free_frames(&mut self, pa: PhysAddr) {
        assert!(pa.is_page_aligned(), "freeing an unaligned frame address");
        let index = pa.frame_index();
        assert!(index < self.frames.len(), "freeing a frame outside RAM");

        let pages = self.frames[index].chunk_size as usize;
        self.frames[index].chunk_size = 0;
        for entry in &mut self.frames[index..index + pages] {
            entry.state = FrameState::Free;
        }
    }

    /// Returns the number of bytes currently in `Fixed` frames.
    pub fn used_bytes(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.state == FrameState::Fixed)
            .count()
            * PAGE_SIZE
    }

    /// Returns the remembered chunk length at `pa` (0 when not a chunk base).
    pub fn chunk_size_at(&self, pa: PhysAddr) -> u32 {
        self.frames[pa.frame_index()].chunk_size
    }

    /// Returns the state of the frame at `pa`.
    pub fn frame_state_at(&self, pa: PhysAddr) -> FrameState {
        self.frames[pa.frame_index()].state
    }
}

// ---------------------------------------------------------------------------
// Shared coremap cell
// ---------------------------------------------------------------------------

/// A lock-guarded slot holding the machine's coremap.
///
/// There is one process-wide spin lock over the whole frame table; the
/// single-threaded early-boot phase simply takes it uncontended. The
/// cell starts empty and is populated once at VM bootstrap.
pub struct CoremapCell(SpinLock<Option<Coremap>>);

impl CoremapCell {
    /// Creates an empty cell.
    pub const fn new() -> Self {
        Self(SpinLock::named("coremap", None))
    }

    /// Creates a cell already holding `coremap`.
    pub fn with_coremap(coremap: Coremap) -> Self {
        Self(SpinLock::named("coremap", Some(coremap)))
    }

    /// Installs the coremap at bootstrap.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn init(&self, coremap: Coremap) {
        let mut slot = self.0.lock();
        assert!(slot.is_none(), "coremap already initialized");
        *slot = Some(coremap);
    }

    /// Executes a closure with exclusive access to the coremap.
    ///
    /// # Panics
    ///
    /// Panics if the coremap has not been initialized.
    pub fn with<R>(&self, f: impl FnOnce(&mut Coremap) -> R) -> R {
        let mut slot = self.0.lock();
        f(slot.as_mut().expect("coremap not initialized"))
    }

    /// Attempts to execute a closure with exclusive access to the
    /// coremap.
    ///
    /// Returns `None` if the lock is already held (avoiding deadlock in
    /// fault paths) or the coremap has not been installed yet.
    pub fn try_with<R>(&self, f: impl FnOnce(&mut Coremap) -> R) -> Option<R> {
        let mut slot = self.0.try_lock()?;
        Some(f(slot.as_mut()?))
    }
}

impl Default for CoremapCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated-RAM construction helpers for host tests.
#[cfg(any(test, feature = "std"))]
pub mod test_support {
    extern crate alloc;

    use alloc::vec;

    use super::*;

    /// Builds a coremap over `frames` pages of leaked heap memory
    /// standing in for RAM.
    pub fn test_coremap(frames: usize) -> Coremap {
        let ram = vec![0u8; frames * PAGE_SIZE].leak();
        // SAFETY: The leaked buffer covers [0, frames * PAGE_SIZE) and
        // nothing else touches it.
        unsafe {
            let dirmap = DirectMap::new(ram.as_mut_ptr() as u64);
            Coremap::new(frames, dirmap)
        }
    }
}
