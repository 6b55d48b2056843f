//! Copying data across the user/kernel boundary.
//!
//! User pointers are validated (non-null, below the kernel band) before
//! any side effect, then walked page by page through the address
//! space's page map and the direct-map window. Reads treat a lazy page
//! as zeros, exactly as a fault would produce; writes back unmapped but
//! legal pages on demand through the same path the fault handler uses.

extern crate alloc;

use alloc::vec::Vec;

use ferrite_core::addr::{PAGE_SIZE, VirtAddr};
use ferrite_core::syscall::Errno;
use ferrite_mm::layout::{DirectMap, USER_SPACE_TOP};
use ferrite_mm::{AddressSpace, Coremap, is_legal_user_address};

/// Validates a user pointer: non-null and below the kernel band.
pub fn check_user_ptr(addr: VirtAddr) -> Result<(), Errno> {
    if addr.as_u64() == 0 || addr.as_u64() >= USER_SPACE_TOP {
        return Err(Errno::Fault);
    }
    Ok(())
}

/// Validates that `[addr, addr + len)` lies entirely in user space.
pub fn check_user_range(addr: VirtAddr, len: usize) -> Result<(), Errno> {
    if len == 0 {
        return check_user_ptr(addr);
    }
    let end = addr
        .as_u64()
        .checked_add(len as u64)
        .ok_or(Errno::Fault)?;
    if addr.as_u64() == 0 || end > USER_SPACE_TOP {
        return Err(Errno::Fault);
    }
    Ok(())
}

/// Copies `buf.len()` bytes from user address `uaddr` into `buf`.
///
/// Unmapped pages fail with bad-address; lazy pages read as zeros.
pub fn copy_in(
    aspace: &AddressSpace,
    dm: &DirectMap,
    uaddr: VirtAddr,
    buf: &mut [u8],
) -> Result<(), Errno> {
    check_user_range(uaddr, buf.len())?;

    let mut done = 0;
    while done < buf.len() {
        let va = uaddr + done as u64;
        let page = va.page_base();
        let offset = va.page_offset();
        let n = (PAGE_SIZE - offset as usize).min(buf.len() - done);

        match aspace.lookup_page(page) {
            Some(Some(pa)) => dm.read_bytes(pa + offset, &mut buf[done..done + n]),
            Some(None) => buf[done..done + n].fill(0),
            None => return Err(Errno::Fault),
        }
        done += n;
    }
    Ok(())
}

/// Reads a little word the size of a user pointer.
pub fn copy_in_u32(aspace: &AddressSpace, dm: &DirectMap, uaddr: VirtAddr) -> Result<u32, Errno> {
    if !uaddr.is_aligned(4) {
        return Err(Errno::Fault);
    }
    let mut bytes = [0u8; 4];
    copy_in(aspace, dm, uaddr, &mut bytes)?;
    Ok(u32::from_ne_bytes(bytes))
}

/// Copies a NUL-terminated string of at most `cap` bytes (terminator
/// excluded) from user space. Returns the bytes without the NUL.
///
/// A string that does not terminate within the budget fails with
/// argument-list-too-long.
pub fn copy_in_str(
    aspace: &AddressSpace,
    dm: &DirectMap,
    uaddr: VirtAddr,
    cap: usize,
) -> Result<Vec<u8>, Errno> {
    check_user_ptr(uaddr)?;

    let mut out = Vec::new();
    let mut chunk = [0u8; 128];
    let mut pos = 0usize;

    loop {
        // Stay inside one page per read so a string ending just before
        // an unmapped page never faults on the page beyond its NUL.
        let page_remaining = PAGE_SIZE - (uaddr + pos as u64).page_offset() as usize;
        let want = chunk.len().min(cap + 1 - pos).min(page_remaining);
        if want == 0 {
            return Err(Errno::TooBig);
        }
        copy_in(aspace, dm, uaddr + pos as u64, &mut chunk[..want])?;

        if let Some(nul) = chunk[..want].iter().position(|&b| b == 0) {
            out.extend_from_slice(&chunk[..nul]);
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..want]);
        pos += want;
    }
}

/// Copies `data` to user address `uaddr`, backing legal-but-unmapped
/// pages with zeroed frames on the way.
pub fn copy_out(
    aspace: &mut AddressSpace,
    cm: &mut Coremap,
    uaddr: VirtAddr,
    data: &[u8],
) -> Result<(), Errno> {
    check_user_range(uaddr, data.len())?;

    let dm = cm.dirmap();
    let mut done = 0;
    while done < data.len() {
        let va = uaddr + done as u64;
        let page = va.page_base();
        let offset = va.page_offset();
        let n = (PAGE_SIZE - offset as usize).min(data.len() - done);

        if !is_legal_user_address(aspace, page) {
            return Err(Errno::Fault);
        }
        let pa = aspace.ensure_backed(page, cm)?;
        dm.write_bytes(pa + offset, &data[done..done + n]);
        done += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_mm::RegionPerms;
    use ferrite_mm::coremap::test_support::test_coremap;
    use ferrite_mm::layout::USER_STACK_TOP;

    const RW: RegionPerms = RegionPerms::READ.union(RegionPerms::WRITE);

    fn fixture() -> (AddressSpace, Coremap) {
        let mut aspace = AddressSpace::new();
        aspace.define_region(VirtAddr::new(0x400000), 2 * PAGE_SIZE as u64, RW);
        (aspace, test_coremap(32))
    }

    #[test]
    fn pointer_validation() {
        assert_eq!(check_user_ptr(VirtAddr::zero()).err(), Some(Errno::Fault));
        assert_eq!(
            check_user_ptr(VirtAddr::new(USER_SPACE_TOP)).err(),
            Some(Errno::Fault)
        );
        assert!(check_user_ptr(VirtAddr::new(0x400000)).is_ok());

        // A range must not leak into the kernel band.
        assert_eq!(
            check_user_range(VirtAddr::new(USER_SPACE_TOP - 4), 8).err(),
            Some(Errno::Fault)
        );
        assert!(check_user_range(VirtAddr::new(USER_SPACE_TOP - 8), 8).is_ok());
    }

    #[test]
    fn roundtrip_within_one_page() {
        let (mut aspace, mut cm) = fixture();
        let addr = VirtAddr::new(0x400010);

        copy_out(&mut aspace, &mut cm, addr, b"over the fence").unwrap();

        let dm = cm.dirmap();
        let mut back = [0u8; 14];
        copy_in(&aspace, &dm, addr, &mut back).unwrap();
        assert_eq!(&back, b"over the fence");
    }

    #[test]
    fn roundtrip_across_page_boundary() {
        let (mut aspace, mut cm) = fixture();
        // Straddle the boundary between the two region pages.
        let addr = VirtAddr::new(0x400000 + PAGE_SIZE as u64 - 3);
        copy_out(&mut aspace, &mut cm, addr, b"straddle").unwrap();

        let dm = cm.dirmap();
        let mut back = [0u8; 8];
        copy_in(&aspace, &dm, addr, &mut back).unwrap();
        assert_eq!(&back, b"straddle");
    }

    #[test]
    fn copy_in_unmapped_faults() {
        let (aspace, cm) = fixture();
        let dm = cm.dirmap();
        let mut buf = [0u8; 4];
        assert_eq!(
            copy_in(&aspace, &dm, VirtAddr::new(0x400000), &mut buf).err(),
            Some(Errno::Fault),
            "never-touched region page has no frame to read"
        );
    }

    #[test]
    fn copy_in_lazy_page_reads_zero() {
        let (mut aspace, cm) = fixture();
        aspace.sbrk(PAGE_SIZE as i64).unwrap();
        let heap = aspace.heap_start();

        let dm = cm.dirmap();
        let mut buf = [0xffu8; 8];
        copy_in(&aspace, &dm, heap, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn copy_out_illegal_address_faults() {
        let (mut aspace, mut cm) = fixture();
        // The no-man's-land between heap and stack window.
        assert_eq!(
            copy_out(&mut aspace, &mut cm, VirtAddr::new(0x2000_0000), b"x").err(),
            Some(Errno::Fault)
        );
    }

    #[test]
    fn copy_out_backs_stack_pages() {
        let (mut aspace, mut cm) = fixture();
        let addr = USER_STACK_TOP - 64;
        copy_out(&mut aspace, &mut cm, addr, b"stack bytes").unwrap();
        assert!(matches!(aspace.lookup_page(addr.page_base()), Some(Some(_))));
    }

    #[test]
    fn copy_in_str_stops_at_nul() {
        let (mut aspace, mut cm) = fixture();
        let addr = VirtAddr::new(0x400100);
        copy_out(&mut aspace, &mut cm, addr, b"hello\0trailing").unwrap();

        let dm = cm.dirmap();
        let s = copy_in_str(&aspace, &dm, addr, 64).unwrap();
        assert_eq!(s, b"hello");
    }

    #[test]
    fn copy_in_str_enforces_cap() {
        let (mut aspace, mut cm) = fixture();
        let addr = VirtAddr::new(0x400100);
        copy_out(&mut aspace, &mut cm, addr, b"abcdefgh\0").unwrap();

        let dm = cm.dirmap();
        assert!(copy_in_str(&aspace, &dm, addr, 8).is_ok());
        assert_eq!(
            copy_in_str(&aspace, &dm, addr, 7).err(),
            Some(Errno::TooBig)
        );
    }

    #[test]
    fn copy_in_u32_requires_alignment() {
        let (mut aspace, mut cm) = fixture();
        let addr = VirtAddr::new(0x400020);
        copy_out(&mut aspace, &mut cm, addr, &0xdead_beefu32.to_ne_bytes()).unwrap();

        let dm = cm.dirmap();
        assert_eq!(copy_in_u32(&aspace, &dm, addr).unwrap(), 0xdead_beef);
        assert_eq!(
            copy_in_u32(&aspace, &dm, addr + 1).err(),
            Some(Errno::Fault)
        );
    }
}
