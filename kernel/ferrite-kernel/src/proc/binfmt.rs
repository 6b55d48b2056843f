//! Executable loading seam.
//!
//! exec drives loading through the [`BinaryLoader`] trait; the real ELF
//! loader plugs in behind it. [`FlatImageLoader`] loads headerless flat
//! images and keeps the pipeline exercisable without an ELF toolchain.

extern crate alloc;

use alloc::sync::Arc;

use ferrite_core::addr::{PAGE_SIZE, VirtAddr};
use ferrite_core::syscall::Errno;
use ferrite_mm::{AddressSpace, Coremap, RegionPerms};

use crate::fs::Vnode;

/// Maps an executable image into a fresh address space.
pub trait BinaryLoader: Send + Sync {
    /// Defines the image's regions in `aspace`, copies the contents in,
    /// and returns the entry point.
    fn load(
        &self,
        vnode: &Arc<dyn Vnode>,
        aspace: &mut AddressSpace,
        coremap: &mut Coremap,
    ) -> Result<VirtAddr, Errno>;
}

/// Loads a headerless flat image at a fixed base; entry is the base.
pub struct FlatImageLoader {
    /// Virtual address the image is mapped at.
    pub base: VirtAddr,
}

impl FlatImageLoader {
    /// Conventional text base for flat user images.
    pub fn at_default_base() -> Self {
        Self {
            base: VirtAddr::new(0x0040_0000),
        }
    }
}

impl BinaryLoader for FlatImageLoader {
    fn load(
        &self,
        vnode: &Arc<dyn Vnode>,
        aspace: &mut AddressSpace,
        coremap: &mut Coremap,
    ) -> Result<VirtAddr, Errno> {
        let size = vnode.size();
        if size == 0 {
            return Err(Errno::NoExec);
        }

        aspace.define_region(
            self.base,
            size,
            RegionPerms::READ | RegionPerms::WRITE | RegionPerms::EXEC,
        );

        let dm = coremap.dirmap();
        let mut page_buf = [0u8; PAGE_SIZE];
        let mut copied = 0u64;
        while copied < size {
            let va = self.base + copied;
            // Cap each read at the frame boundary; short vnode reads
            // would otherwise desynchronize offsets from frames.
            let want = PAGE_SIZE - va.page_offset() as usize;
            let n = vnode.read_at(copied, &mut page_buf[..want])?;
            if n == 0 {
                break;
            }
            let pa = aspace.ensure_backed(va.page_base(), coremap)?;
            dm.write_bytes(pa + va.page_offset(), &page_buf[..n]);
            copied += n as u64;
        }

        Ok(self.base)
    }
}
