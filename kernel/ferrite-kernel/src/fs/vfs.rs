//! The vnode abstraction and a flat name registry.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use ferrite_core::sync::SpinLock;
use ferrite_core::syscall::Errno;

/// A file-like kernel object.
///
/// Offsets live in the file handle, not the vnode, so one vnode can
/// back any number of open files.
pub trait Vnode: Send + Sync {
    /// Reads at `offset` into `buf`, returning the byte count (0 at EOF).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno>;

    /// Writes `buf` at `offset`, returning the byte count.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno>;

    /// Current size in bytes.
    fn size(&self) -> u64;

    /// Whether seeking past the stream position makes sense.
    fn is_seekable(&self) -> bool {
        true
    }
}

/// A RAM-backed file.
pub struct MemFile {
    data: SpinLock<Vec<u8>>,
}

impl MemFile {
    /// Creates an empty file.
    pub fn new() -> Arc<Self> {
        Self::with_contents(Vec::new())
    }

    /// Creates a file holding `data`.
    pub fn with_contents(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(data),
        })
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl Vnode for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
        let data = self.data.lock();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        let mut data = self.data.lock();
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }
}

/// A directory vnode. Carries no data of its own; byte access refuses.
pub struct DirNode;

impl Vnode for DirNode {
    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::IsDir)
    }

    fn write_at(&self, _offset: u64, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::IsDir)
    }

    fn size(&self) -> u64 {
        0
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

enum VfsEntry {
    File(Arc<dyn Vnode>),
    Dir(Arc<DirNode>),
}

/// Flat path-to-vnode registry.
///
/// Stands in for a mounted filesystem tree: boot code registers the
/// console device, directories, and executables under absolute paths.
pub struct Vfs {
    entries: SpinLock<BTreeMap<String, VfsEntry>>,
}

impl Vfs {
    /// Creates a registry holding only the root directory.
    pub fn new() -> Self {
        let vfs = Self {
            entries: SpinLock::new(BTreeMap::new()),
        };
        vfs.register_dir("/");
        vfs
    }

    /// Registers a file-like vnode under `path`.
    pub fn register_file(&self, path: &str, vnode: Arc<dyn Vnode>) {
        self.entries
            .lock()
            .insert(path.to_string(), VfsEntry::File(vnode));
    }

    /// Registers a directory under `path`.
    pub fn register_dir(&self, path: &str) {
        self.entries
            .lock()
            .insert(path.to_string(), VfsEntry::Dir(Arc::new(DirNode)));
    }

    /// Resolves `path` to a file vnode.
    pub fn resolve(&self, path: &str) -> Result<Arc<dyn Vnode>, Errno> {
        match self.entries.lock().get(path) {
            Some(VfsEntry::File(vnode)) => Ok(vnode.clone()),
            Some(VfsEntry::Dir(_)) => Err(Errno::IsDir),
            None => Err(Errno::NoEnt),
        }
    }

    /// Resolves `path` to a directory vnode.
    pub fn resolve_dir(&self, path: &str) -> Result<Arc<DirNode>, Errno> {
        match self.entries.lock().get(path) {
            Some(VfsEntry::Dir(dir)) => Ok(dir.clone()),
            Some(VfsEntry::File(_)) => Err(Errno::NotDir),
            None => Err(Errno::NoEnt),
        }
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// A process's current directory: the path for `__getcwd` plus the
/// directory vnode it resolved to.
pub struct Cwd {
    /// Absolute path.
    pub path: String,
    /// The directory's vnode.
    pub vnode: Arc<DirNode>,
}

impl Cwd {
    /// The root directory.
    pub fn root() -> Self {
        Self {
            path: "/".to_string(),
            vnode: Arc::new(DirNode),
        }
    }
}
