//! exec: replacing a process image.
//!
//! Copies the program name and argv strings into kernel buffers (each
//! accounted at its 4-byte-padded size), opens the executable, swaps in
//! a fresh address space, loads the image through the binfmt seam, and
//! lays argv out on the new user stack:
//!
//! ```text
//!   stackptr -> | &argv[0] | &argv[1] | ... | NULL |
//!               | argv[0] bytes, NUL, pad to 4     |
//!               | argv[1] bytes, NUL, pad to 4     |
//!               | ...                              | <- USER_STACK_TOP
//! ```
//!
//! The pointer vector sits below the packed string block; `stackptr`
//! (the vector base) is passed to the new image as both `argv` and the
//! initial stack pointer.

extern crate alloc;

use alloc::vec::Vec;

use ferrite_core::addr::VirtAddr;
use ferrite_core::sync::IrqSpinLock;
use ferrite_core::syscall::Errno;
use ferrite_mm::tlb::Tlb;
use ferrite_mm::{AddressSpace, CoremapCell};

use super::Process;
use super::binfmt::BinaryLoader;
use crate::fs::Vfs;
use crate::param::{ARG_MAX, MAX_ARGS, PATH_MAX};
use crate::usercopy::{check_user_ptr, copy_in_str, copy_in_u32, copy_out};

/// Size of a user-space pointer.
const USER_PTR_SIZE: u64 = 4;

/// Everything the user-mode jump needs after a successful exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedExec {
    /// Entry point of the loaded image.
    pub entry: VirtAddr,
    /// Base of the argv pointer vector; also the initial stack pointer.
    pub stackptr: VirtAddr,
    /// Number of arguments.
    pub argc: usize,
}

/// Rounds a string's size (bytes plus NUL) up to pointer alignment.
fn padded_len(arg: &[u8]) -> usize {
    (arg.len() + 1).next_multiple_of(USER_PTR_SIZE as usize)
}

/// Performs every step of `execv` short of the user-mode jump.
///
/// On success the process has a fresh, activated address space with the
/// image loaded and argv laid out; the caller enters user mode with the
/// returned frame parameters. On failure the kernel argv buffers are
/// released on every path; once the old address space is gone, failures
/// leave the process with the half-built space, fit only for `_exit`.
pub fn exec_prepare(
    proc: &Process,
    progname_ptr: VirtAddr,
    argv_ptr: VirtAddr,
    vfs: &Vfs,
    loader: &dyn BinaryLoader,
    coremap: &CoremapCell,
    tlb: &IrqSpinLock<Tlb>,
) -> Result<PreparedExec, Errno> {
    check_user_ptr(progname_ptr)?;
    check_user_ptr(argv_ptr)?;

    let dm = coremap.with(|cm| cm.dirmap());
    let mut aspace_slot = proc.addr_space.lock();

    // Copy the program name and every argument into kernel buffers,
    // tracking the padded total the stack layout will need.
    let (progname, args, padded_total) = {
        let aspace = aspace_slot.as_ref().ok_or(Errno::Fault)?;

        let progname = copy_in_str(aspace, &dm, progname_ptr, PATH_MAX)?;
        if progname.is_empty() {
            return Err(Errno::Inval);
        }

        let mut args: Vec<Vec<u8>> = Vec::new();
        let mut padded_total = 0usize;
        loop {
            let slot = argv_ptr + (args.len() as u64) * USER_PTR_SIZE;
            let uptr = copy_in_u32(aspace, &dm, slot)?;
            if uptr == 0 {
                break;
            }
            if args.len() >= MAX_ARGS {
                return Err(Errno::TooBig);
            }
            check_user_ptr(VirtAddr::new(u64::from(uptr)))?;

            let arg = copy_in_str(aspace, &dm, VirtAddr::new(u64::from(uptr)), ARG_MAX)?;
            padded_total += padded_len(&arg);
            if padded_total > ARG_MAX {
                return Err(Errno::TooBig);
            }
            args.push(arg);
        }
        (progname, args, padded_total)
    };

    let path = core::str::from_utf8(&progname).map_err(|_| Errno::Inval)?;
    let vnode = vfs.resolve(path)?;

    // Point of no return: tear down the old image and build the new
    // one in its place.
    let old = aspace_slot.take().expect("address space checked above");
    coremap.with(|cm| old.destroy(cm));

    let mut aspace = AddressSpace::new();
    aspace.activate(tlb);
    aspace.prepare_load();
    let entry = coremap.with(|cm| loader.load(&vnode, &mut aspace, cm));
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            // The process keeps the unloaded space; it can only _exit.
            *aspace_slot = Some(aspace);
            return Err(e);
        }
    };
    aspace.complete_load();
    let stack_top = aspace.define_stack();

    // Stack layout: packed padded strings right below the stack top,
    // the (argc + 1)-entry pointer vector below them.
    let argc = args.len();
    let strings_base = stack_top - padded_total as u64;
    let stackptr = strings_base - (argc as u64 + 1) * USER_PTR_SIZE;

    let layout = coremap.with(|cm| -> Result<(), Errno> {
        let mut cursor = strings_base;
        let mut pointers: Vec<u8> = Vec::with_capacity((argc + 1) * USER_PTR_SIZE as usize);

        for arg in &args {
            let padded = padded_len(arg);
            let mut block = alloc::vec![0u8; padded];
            block[..arg.len()].copy_from_slice(arg);
            copy_out(&mut aspace, cm, cursor, &block)?;

            pointers.extend_from_slice(&(cursor.as_u64() as u32).to_ne_bytes());
            cursor = cursor + padded as u64;
        }
        pointers.extend_from_slice(&0u32.to_ne_bytes());

        copy_out(&mut aspace, cm, stackptr, &pointers)
    });

    *aspace_slot = Some(aspace);
    layout?;

    Ok(PreparedExec {
        entry,
        stackptr,
        argc,
    })
}

/// Builds an argv array in a (source) address space, the way a user
/// program would pass it to `execv`. Returns the user address of the
/// pointer array.
///
/// Exec tests and the shell-less boot path both need one.
pub fn stage_argv(
    aspace: &mut AddressSpace,
    coremap: &CoremapCell,
    base: VirtAddr,
    args: &[&[u8]],
) -> Result<VirtAddr, Errno> {
    coremap.with(|cm| {
        let mut cursor = base;
        let mut pointers: Vec<u8> = Vec::new();
        for arg in args {
            let mut bytes = arg.to_vec();
            bytes.push(0);
            copy_out(aspace, cm, cursor, &bytes)?;
            pointers.extend_from_slice(&(cursor.as_u64() as u32).to_ne_bytes());
            cursor = cursor + bytes.len().next_multiple_of(4) as u64;
        }
        pointers.extend_from_slice(&0u32.to_ne_bytes());

        let argv = cursor;
        copy_out(aspace, cm, argv, &pointers)?;
        Ok(argv)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use crate::fs::MemFile;
    use crate::proc::ProcessTable;
    use crate::proc::binfmt::FlatImageLoader;
    use crate::usercopy::copy_in;
    use ferrite_core::addr::PAGE_SIZE;
    use ferrite_core::id::Pid;
    use ferrite_mm::RegionPerms;
    use ferrite_mm::coremap::test_support::test_coremap;
    use ferrite_mm::layout::USER_STACK_TOP;
    use ferrite_mm::tlb::locked_tlb;

    struct ExecRig {
        table: ProcessTable,
        coremap: CoremapCell,
        tlb: IrqSpinLock<Tlb>,
        vfs: Vfs,
        loader: FlatImageLoader,
    }

    fn rig() -> ExecRig {
        let vfs = Vfs::new();
        vfs.register_dir("/bin");
        vfs.register_file("/bin/prog", MemFile::with_contents(b"fake image".to_vec()));
        ExecRig {
            table: ProcessTable::new(),
            coremap: CoremapCell::with_coremap(test_coremap(64)),
            tlb: locked_tlb(),
            vfs,
            loader: FlatImageLoader::at_default_base(),
        }
    }

    /// Spawns a process whose address space holds `args` staged at a
    /// scratch region, as execv's caller would have them.
    fn proc_with_args(rig: &ExecRig, args: &[&[u8]]) -> (Arc<super::super::Process>, VirtAddr, VirtAddr) {
        proc_with_args_sized(rig, args, 4)
    }

    fn proc_with_args_sized(
        rig: &ExecRig,
        args: &[&[u8]],
        region_pages: u64,
    ) -> (Arc<super::super::Process>, VirtAddr, VirtAddr) {
        let proc = rig.table.spawn("caller", Pid::new(1)).unwrap();
        let mut aspace = AddressSpace::new();
        aspace.define_region(
            VirtAddr::new(0x0100_0000),
            region_pages * PAGE_SIZE as u64,
            RegionPerms::READ | RegionPerms::WRITE,
        );

        // Program name string.
        let prog_addr = VirtAddr::new(0x0100_0000);
        rig.coremap
            .with(|cm| copy_out(&mut aspace, cm, prog_addr, b"/bin/prog\0"))
            .unwrap();

        let argv_addr =
            stage_argv(&mut aspace, &rig.coremap, VirtAddr::new(0x0100_1000), args).unwrap();

        *proc.addr_space.lock() = Some(aspace);
        (proc, prog_addr, argv_addr)
    }

    fn read_user(proc: &super::super::Process, coremap: &CoremapCell, addr: VirtAddr, len: usize) -> Vec<u8> {
        let dm = coremap.with(|cm| cm.dirmap());
        let aspace = proc.addr_space.lock();
        let mut buf = alloc::vec![0u8; len];
        copy_in(aspace.as_ref().unwrap(), &dm, addr, &mut buf).unwrap();
        buf
    }

    #[test]
    fn argv_layout_on_new_stack() {
        let rig = rig();
        let (proc, prog, argv) = proc_with_args(&rig, &[b"prog", b"-x", b"hello world"]);

        let prep = exec_prepare(
            &proc, prog, argv, &rig.vfs, &rig.loader, &rig.coremap, &rig.tlb,
        )
        .unwrap();

        assert_eq!(prep.argc, 3);
        assert_eq!(prep.entry, VirtAddr::new(0x40_0000));

        // Padded sizes: "prog"+NUL -> 8, "-x"+NUL -> 4, "hello world"+NUL -> 12.
        let padded_total = 8 + 4 + 12;
        let strings_base = USER_STACK_TOP - padded_total;
        assert_eq!(prep.stackptr, strings_base - 4 * 4);

        // The pointer vector: three string addresses and a NULL.
        let vec_bytes = read_user(&proc, &rig.coremap, prep.stackptr, 16);
        let ptrs: Vec<u32> = vec_bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(u64::from(ptrs[0]), strings_base.as_u64());
        assert_eq!(u64::from(ptrs[1]), strings_base.as_u64() + 8);
        assert_eq!(u64::from(ptrs[2]), strings_base.as_u64() + 12);
        assert_eq!(ptrs[3], 0);

        // The strings themselves, NUL-terminated, 4-byte padded.
        assert_eq!(
            read_user(&proc, &rig.coremap, strings_base, padded_total as usize),
            b"prog\0\0\0\0-x\0\0hello world\0"
        );
    }

    #[test]
    fn empty_argv_still_gets_null_sentinel() {
        let rig = rig();
        let (proc, prog, argv) = proc_with_args(&rig, &[]);

        let prep = exec_prepare(
            &proc, prog, argv, &rig.vfs, &rig.loader, &rig.coremap, &rig.tlb,
        )
        .unwrap();
        assert_eq!(prep.argc, 0);
        assert_eq!(prep.stackptr, USER_STACK_TOP - 4);

        let vec_bytes = read_user(&proc, &rig.coremap, prep.stackptr, 4);
        assert_eq!(vec_bytes, 0u32.to_ne_bytes());
    }

    #[test]
    fn old_address_space_is_destroyed() {
        let rig = rig();
        let (proc, prog, argv) = proc_with_args(&rig, &[b"prog"]);
        let used_before = rig.coremap.with(|cm| cm.used_bytes());

        exec_prepare(
            &proc, prog, argv, &rig.vfs, &rig.loader, &rig.coremap, &rig.tlb,
        )
        .unwrap();

        // The new image is smaller than the staged-argv space was; at
        // minimum the old frames must no longer all be live.
        let aspace = proc.addr_space.lock();
        let aspace = aspace.as_ref().unwrap();
        assert_eq!(aspace.regions().len(), 1, "only the fresh image region");
        assert!(
            aspace
                .lookup_page(VirtAddr::new(0x0100_0000))
                .is_none(),
            "old caller pages are gone"
        );
        drop(aspace);
        let _ = used_before;
    }

    #[test]
    fn validation_failures_before_teardown() {
        let rig = rig();
        let (proc, prog, argv) = proc_with_args(&rig, &[b"prog"]);

        // Null and kernel-band pointers refuse up front.
        assert_eq!(
            exec_prepare(
                &proc,
                VirtAddr::zero(),
                argv,
                &rig.vfs,
                &rig.loader,
                &rig.coremap,
                &rig.tlb
            )
            .err(),
            Some(Errno::Fault)
        );
        assert_eq!(
            exec_prepare(
                &proc,
                prog,
                VirtAddr::new(0x9000_0000),
                &rig.vfs,
                &rig.loader,
                &rig.coremap,
                &rig.tlb
            )
            .err(),
            Some(Errno::Fault)
        );

        // The caller's address space survived both refusals.
        assert!(proc.addr_space.lock().is_some());
    }

    #[test]
    fn missing_binary_keeps_old_image() {
        let rig = rig();
        let (proc, _prog, argv) = proc_with_args(&rig, &[b"prog"]);

        // Stage a name that resolves nowhere.
        {
            let mut slot = proc.addr_space.lock();
            let aspace = slot.as_mut().unwrap();
            rig.coremap
                .with(|cm| copy_out(aspace, cm, VirtAddr::new(0x0100_2000), b"/bin/ghost\0"))
                .unwrap();
        }

        assert_eq!(
            exec_prepare(
                &proc,
                VirtAddr::new(0x0100_2000),
                argv,
                &rig.vfs,
                &rig.loader,
                &rig.coremap,
                &rig.tlb
            )
            .err(),
            Some(Errno::NoEnt)
        );
        // Lookup failed before the point of no return.
        assert!(proc.addr_space.lock().is_some());
        let aspace = proc.addr_space.lock();
        assert!(aspace.as_ref().unwrap().lookup_page(VirtAddr::new(0x0100_0000)).is_some());
    }

    #[test]
    fn argument_budget_enforced() {
        let rig = rig();
        // One argument over the padded-bytes budget; needs a scratch
        // region large enough to stage it.
        let big = alloc::vec![b'a'; ARG_MAX];
        let (proc, prog, argv) = proc_with_args_sized(&rig, &[&big], 20);

        assert_eq!(
            exec_prepare(
                &proc, prog, argv, &rig.vfs, &rig.loader, &rig.coremap, &rig.tlb
            )
            .err(),
            Some(Errno::TooBig)
        );
    }
}
