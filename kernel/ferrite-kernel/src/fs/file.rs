//! Open files and the per-process descriptor table.
//!
//! A [`FileHandle`] pairs a vnode with open flags and a locked offset;
//! descriptor sharing (`dup2`, fork inheritance) is expressed through
//! `Arc` handles, so the handle — and with it the shared offset — lives
//! until its last descriptor closes.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use ferrite_core::id::Fd;
use ferrite_core::sync::SpinLock;
use ferrite_core::syscall::{Errno, SEEK_CUR, SEEK_END, SEEK_SET};

use super::vfs::Vnode;
use crate::param::OPEN_MAX;

/// POSIX read-only open mode.
pub const O_RDONLY: u32 = 0;
/// POSIX write-only open mode.
pub const O_WRONLY: u32 = 1;
/// POSIX read-write open mode.
pub const O_RDWR: u32 = 2;
/// Mask of the access-mode bits.
const O_ACCMODE: u32 = 3;

bitflags! {
    /// Access rights on an open file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u8 {
        /// Reads permitted.
        const READ = 1 << 0;
        /// Writes permitted.
        const WRITE = 1 << 1;
    }
}

impl OpenFlags {
    /// Decodes the POSIX access-mode bits.
    pub fn from_posix(flags: u32) -> Result<Self, Errno> {
        match flags & O_ACCMODE {
            O_RDONLY => Ok(Self::READ),
            O_WRONLY => Ok(Self::WRITE),
            O_RDWR => Ok(Self::READ | Self::WRITE),
            _ => Err(Errno::Inval),
        }
    }
}

/// Offset state, guarded by the handle's lock.
struct FileState {
    offset: u64,
}

/// An open file: vnode, access mode, and a shared offset.
pub struct FileHandle {
    vnode: Arc<dyn Vnode>,
    flags: OpenFlags,
    state: SpinLock<FileState>,
}

impl FileHandle {
    /// Opens `vnode` with the given access mode, offset 0.
    pub fn new(vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Arc<Self> {
        Arc::new(Self {
            vnode,
            flags,
            state: SpinLock::named("filehandle", FileState { offset: 0 }),
        })
    }

    /// Returns the backing vnode.
    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    /// Returns the access mode.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Returns the current offset.
    pub fn offset(&self) -> u64 {
        self.state.lock().offset
    }

    /// Reads from the current offset, advancing it by the byte count.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(Errno::Acces);
        }
        let mut state = self.state.lock();
        let n = self.vnode.read_at(state.offset, buf)?;
        state.offset += n as u64;
        Ok(n)
    }

    /// Writes at the current offset, advancing it by the byte count.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(Errno::Acces);
        }
        let mut state = self.state.lock();
        let n = self.vnode.write_at(state.offset, buf)?;
        state.offset += n as u64;
        Ok(n)
    }

    /// Repositions the offset. Refuses on non-seekable vnodes and on
    /// positions that would go negative.
    pub fn seek(&self, pos: i64, whence: i32) -> Result<u64, Errno> {
        if !self.vnode.is_seekable() {
            return Err(Errno::SPipe);
        }
        let mut state = self.state.lock();
        let base: i64 = match whence {
            SEEK_SET => 0,
            SEEK_CUR => state.offset as i64,
            SEEK_END => self.vnode.size() as i64,
            _ => return Err(Errno::Inval),
        };
        let target = base.checked_add(pos).ok_or(Errno::Inval)?;
        if target < 0 {
            return Err(Errno::Inval);
        }
        state.offset = target as u64;
        Ok(state.offset)
    }
}

/// The per-process descriptor table.
pub struct FileTable {
    slots: Vec<Option<Arc<FileHandle>>>,
}

impl FileTable {
    /// Creates an empty table of [`OPEN_MAX`] slots.
    pub fn new() -> Self {
        Self {
            slots: (0..OPEN_MAX).map(|_| None).collect(),
        }
    }

    fn check(fd: Fd) -> Result<usize, Errno> {
        let index = fd.as_usize();
        if index < OPEN_MAX { Ok(index) } else { Err(Errno::BadF) }
    }

    /// Returns the handle for `fd`.
    pub fn get(&self, fd: Fd) -> Result<Arc<FileHandle>, Errno> {
        self.slots[Self::check(fd)?].clone().ok_or(Errno::BadF)
    }

    /// Installs `handle` in the first free descriptor at or above 3
    /// (0-2 belong to the standard streams).
    pub fn insert(&mut self, handle: Arc<FileHandle>) -> Result<Fd, Errno> {
        for index in 3..OPEN_MAX {
            if self.slots[index].is_none() {
                self.slots[index] = Some(handle);
                return Ok(Fd::new(index as u32));
            }
        }
        Err(Errno::MFile)
    }

    /// Installs `handle` at a specific descriptor, dropping any
    /// previous occupant.
    pub fn insert_at(&mut self, fd: Fd, handle: Arc<FileHandle>) -> Result<(), Errno> {
        let index = Self::check(fd)?;
        self.slots[index] = Some(handle);
        Ok(())
    }

    /// Closes `fd`, returning its handle.
    pub fn remove(&mut self, fd: Fd) -> Result<Arc<FileHandle>, Errno> {
        let index = Self::check(fd)?;
        self.slots[index].take().ok_or(Errno::BadF)
    }

    /// Makes `new` refer to the same open file as `old`.
    ///
    /// Any file previously open at `new` is closed; `old == new` is a
    /// no-op returning `new`.
    pub fn dup2(&mut self, old: Fd, new: Fd) -> Result<Fd, Errno> {
        let old_index = Self::check(old)?;
        let new_index = Self::check(new)?;
        let handle = self.slots[old_index].clone().ok_or(Errno::BadF)?;
        if old_index != new_index {
            self.slots[new_index] = Some(handle);
        }
        Ok(new)
    }

    /// Clones the table for a forked child: the child shares every
    /// open-file handle (and thus every offset) with the parent.
    pub fn duplicate(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }

    /// Returns the number of open descriptors.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
