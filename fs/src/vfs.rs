//! The storage seam.

use alloc::vec::Vec;

use crate::error::FsResult;
use crate::types::{DirEntry, FileHandle, Metadata, OpenOptions, SeekFrom};

/// The flash filesystem as a path-addressed byte store.
///
/// Paths are absolute, normalized, `/`-separated strings; the chroot
/// router guarantees that before calls arrive here. Directory listings
/// are returned as a buffered snapshot, which is what makes two-pass
/// consumers (the image packer counts, then streams) deterministic.
pub trait Vfs: Send + Sync {
    /// Open a file. `CREATE` requires an existing parent directory.
    fn open(&self, path: &str, opts: OpenOptions) -> FsResult<FileHandle>;

    /// Read into `buf` at the handle's position, advancing it. Returns 0
    /// at end of file.
    fn read(&self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize>;

    /// Write `buf` at the handle's position, advancing it.
    fn write(&self, handle: FileHandle, buf: &[u8]) -> FsResult<usize>;

    /// Reposition the handle, returning the new offset.
    fn seek(&self, handle: FileHandle, from: SeekFrom) -> FsResult<u64>;

    /// Close the handle.
    fn close(&self, handle: FileHandle) -> FsResult<()>;

    /// Stat a path.
    fn stat(&self, path: &str) -> FsResult<Metadata>;

    /// Create a directory. The parent must exist.
    fn mkdir(&self, path: &str) -> FsResult<()>;

    /// Snapshot a directory's entries.
    fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>>;

    /// Rename a file or directory. Fails if the target exists.
    fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Read an extended attribute.
    fn get_attr(&self, path: &str, key: &str) -> FsResult<Vec<u8>>;

    /// Set an extended attribute.
    fn set_attr(&self, path: &str, key: &str, value: &[u8]) -> FsResult<()>;

    /// Remove an extended attribute.
    fn remove_attr(&self, path: &str, key: &str) -> FsResult<()>;
}

/// Read a whole file through a `Vfs`, draining it from offset zero.
pub fn read_to_vec(vfs: &dyn Vfs, path: &str) -> FsResult<Vec<u8>> {
    let handle = vfs.open(path, OpenOptions::read_only())?;
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    let result = loop {
        match vfs.read(handle, &mut chunk) {
            Ok(0) => break Ok(out),
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) => break Err(e),
        }
    };
    vfs.close(handle)?;
    result
}

/// Create a file (truncating any previous content) and write `data`.
pub fn write_all(vfs: &dyn Vfs, path: &str, data: &[u8]) -> FsResult<()> {
    let handle = vfs.open(path, OpenOptions::create_for_write())?;
    let mut off = 0;
    let result = loop {
        if off >= data.len() {
            break Ok(());
        }
        match vfs.write(handle, &data[off..]) {
            Ok(0) => break Err(crate::FsError::NoSpace),
            Ok(n) => off += n,
            Err(e) => break Err(e),
        }
    };
    vfs.close(handle)?;
    result
}
