//! Kernel assembly: one value owning every subsystem.
//!
//! The boot path builds a [`Kernel`] from the platform memory map,
//! registers devices and the binary loader, spawns init, and runs the
//! executor. Tests build small kernels over simulated RAM.

extern crate alloc;

use alloc::sync::Arc;

use ferrite_core::addr::VirtAddr;
use ferrite_core::sync::{IrqSpinLock, SpinLock};
use ferrite_core::syscall::Errno;
use ferrite_core::{kdebug, kerr, kinfo, log};
use ferrite_mm::tlb::{Tlb, locked_tlb};
use ferrite_mm::{Coremap, CoremapCell, DirectMap, FaultKind, vm_fault};

use crate::fs::{Console, Vfs};
use crate::proc::binfmt::BinaryLoader;
use crate::proc::{Process, ProcessTable};
use crate::sched::Executor;

/// The kernel: process table, memory, devices, and the executor.
pub struct Kernel {
    /// All live processes, indexed by PID.
    pub table: Arc<ProcessTable>,
    /// The physical-frame allocator.
    pub coremap: Arc<CoremapCell>,
    /// The CPU's TLB.
    pub tlb: Arc<IrqSpinLock<Tlb>>,
    /// The name registry for files and devices.
    pub vfs: Arc<Vfs>,
    /// The console device behind the standard streams.
    pub console: Arc<Console>,
    /// The task executor.
    pub executor: Arc<Executor>,
    loader: SpinLock<Option<Arc<dyn BinaryLoader>>>,
}

impl Kernel {
    /// Builds a kernel whose coremap is not yet installed; the boot
    /// path calls [`CoremapCell::init`] once RAM is probed.
    pub fn new() -> Self {
        let console = Arc::new(Console::new());
        let vfs = Arc::new(Vfs::new());
        vfs.register_file("con:", console.clone());
        Self {
            table: Arc::new(ProcessTable::new()),
            coremap: Arc::new(CoremapCell::new()),
            tlb: Arc::new(locked_tlb()),
            vfs,
            console,
            executor: Arc::new(Executor::new()),
            loader: SpinLock::named("binfmt", None),
        }
    }

    /// Builds a kernel over a probed RAM range.
    ///
    /// # Safety
    ///
    /// Same contract as [`Coremap::new`]: `dirmap` must cover
    /// `total_frames` frames of otherwise-unused RAM.
    pub unsafe fn bootstrap(total_frames: usize, dirmap: DirectMap) -> Self {
        let kernel = Self::new();
        // From here on the console carries the kernel log.
        log::set_sink(kernel.console.clone());
        // SAFETY: Forwarded contract.
        let coremap = unsafe { Coremap::new(total_frames, dirmap) };
        kinfo!(
            "vm: {} frames, first allocatable frame {}",
            coremap.total_frames(),
            coremap.base_frame()
        );
        kernel.coremap.init(coremap);
        kernel
    }

    /// Registers the executable loader.
    pub fn set_loader(&self, loader: Arc<dyn BinaryLoader>) {
        *self.loader.lock() = Some(loader);
    }

    /// Returns the registered executable loader, if any.
    pub fn loader(&self) -> Option<Arc<dyn BinaryLoader>> {
        self.loader.lock().clone()
    }

    /// Entry point for TLB-miss traps.
    ///
    /// `proc` is the process that was running, if any; a fault with no
    /// process or no address space is an early-boot kernel bug surfaced
    /// as bad-address rather than an infinite fault loop.
    pub fn handle_vm_fault(
        &self,
        proc: Option<&Process>,
        fault_code: u32,
        faultaddress: VirtAddr,
    ) -> Result<(), Errno> {
        let kind = FaultKind::from_code(fault_code)?;
        let proc = proc.ok_or(Errno::Fault)?;
        kdebug!("vm: {:?} fault at {}", kind, faultaddress);

        let mut aspace = proc.addr_space.lock();
        let aspace = aspace.as_mut().ok_or(Errno::Fault)?;
        let result = self
            .coremap
            .with(|cm| vm_fault(aspace, cm, &self.tlb, kind, faultaddress));
        if let Err(e) = result {
            kerr!("vm: {:?} fault at {} refused: {}", kind, faultaddress, e);
        }
        result
    }

    /// Builds a kernel over leaked simulated RAM, for host tests.
    #[cfg(test)]
    pub fn for_tests(frames: usize) -> Self {
        let kernel = Self::new();
        kernel
            .coremap
            .init(ferrite_mm::coremap::test_support::test_coremap(frames));
        kernel
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
