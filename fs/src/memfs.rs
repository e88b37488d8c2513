//! # In-memory filesystem
//!
//! A complete [`Vfs`] implementation backed by an in-memory tree. It
//! stands in for the flash store in the test suites and the simulation
//! profile, with the same contract: absolute paths, buffered directory
//! snapshots in deterministic (lexical) order, rename-to-fresh-target
//! only.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use spin::Mutex;

use crate::error::{FsError, FsResult};
use crate::path;
use crate::types::{DirEntry, FileHandle, FileKind, Metadata, OpenOptions, SeekFrom};
use crate::vfs::Vfs;

/// Maximum number of simultaneously open files.
pub const MAX_OPEN: usize = 64;

enum Node {
    Dir {
        children: BTreeMap<String, Node>,
        attrs: BTreeMap<String, Vec<u8>>,
    },
    File {
        data: Vec<u8>,
        attrs: BTreeMap<String, Vec<u8>>,
    },
}

impl Node {
    fn empty_dir() -> Self {
        Node::Dir {
            children: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }
    }

    fn empty_file() -> Self {
        Node::File {
            data: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }

    fn attrs_mut(&mut self) -> &mut BTreeMap<String, Vec<u8>> {
        match self {
            Node::Dir { attrs, .. } | Node::File { attrs, .. } => attrs,
        }
    }

    fn attrs(&self) -> &BTreeMap<String, Vec<u8>> {
        match self {
            Node::Dir { attrs, .. } | Node::File { attrs, .. } => attrs,
        }
    }
}

struct OpenFile {
    path: String,
    pos: u64,
    opts: OpenOptions,
}

/// In-memory `Vfs` implementation.
pub struct MemFs {
    root: Mutex<Node>,
    handles: Mutex<HashMap<u64, OpenFile>>,
    next_handle: AtomicU64,
}

impl MemFs {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Node::empty_dir()),
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn locate<'a>(root: &'a Node, path: &str) -> FsResult<&'a Node> {
        let mut node = root;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            match node {
                Node::Dir { children, .. } => {
                    node = children.get(seg).ok_or(FsError::NotFound)?;
                }
                Node::File { .. } => return Err(FsError::NotDirectory),
            }
        }
        Ok(node)
    }

    fn locate_mut<'a>(root: &'a mut Node, path: &str) -> FsResult<&'a mut Node> {
        let mut node = root;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            match node {
                Node::Dir { children, .. } => {
                    node = children.get_mut(seg).ok_or(FsError::NotFound)?;
                }
                Node::File { .. } => return Err(FsError::NotDirectory),
            }
        }
        Ok(node)
    }

    /// Split a non-root path into (parent dir node, final segment).
    fn parent_mut<'a>(root: &'a mut Node, path: &str) -> FsResult<(&'a mut BTreeMap<String, Node>, String)> {
        let name = path::basename(path);
        if name.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        let parent = Self::locate_mut(root, path::parent(path))?;
        match parent {
            Node::Dir { children, .. } => Ok((children, name.to_string())),
            Node::File { .. } => Err(FsError::NotDirectory),
        }
    }

    fn with_file_data<T>(
        &self,
        handle: FileHandle,
        need: OpenOptions,
        f: impl FnOnce(&mut Vec<u8>, &mut OpenFile) -> FsResult<T>,
    ) -> FsResult<T> {
        let mut handles = self.handles.lock();
        let open = handles.get_mut(&handle.raw()).ok_or(FsError::BadHandle)?;
        if !open.opts.contains(need) {
            return Err(FsError::AccessMode);
        }
        let mut root = self.root.lock();
        match Self::locate_mut(&mut root, &open.path)? {
            Node::File { data, .. } => f(data, open),
            Node::Dir { .. } => Err(FsError::IsDirectory),
        }
    }
}

impl Vfs for MemFs {
    fn open(&self, raw_path: &str, opts: OpenOptions) -> FsResult<FileHandle> {
        if !opts.intersects(OpenOptions::READ | OpenOptions::WRITE) {
            return Err(FsError::InvalidArgument);
        }
        let p = path::normalize(raw_path)?;
        {
            let mut root = self.root.lock();
            match Self::locate_mut(&mut root, &p) {
                Ok(Node::Dir { .. }) => return Err(FsError::IsDirectory),
                Ok(Node::File { data, .. }) => {
                    if opts.contains(OpenOptions::TRUNCATE) {
                        data.clear();
                    }
                }
                Err(FsError::NotFound) if opts.contains(OpenOptions::CREATE) => {
                    let (children, name) = Self::parent_mut(&mut root, &p)?;
                    children.insert(name, Node::empty_file());
                }
                Err(e) => return Err(e),
            }
        }
        let mut handles = self.handles.lock();
        if handles.len() >= MAX_OPEN {
            return Err(FsError::TooManyOpenFiles);
        }
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        handles.insert(
            id,
            OpenFile {
                path: p,
                pos: 0,
                opts,
            },
        );
        Ok(FileHandle::new(id))
    }

    fn read(&self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        self.with_file_data(handle, OpenOptions::READ, |data, open| {
            let pos = open.pos as usize;
            if pos >= data.len() {
                return Ok(0);
            }
            let n = buf.len().min(data.len() - pos);
            buf[..n].copy_from_slice(&data[pos..pos + n]);
            open.pos += n as u64;
            Ok(n)
        })
    }

    fn write(&self, handle: FileHandle, buf: &[u8]) -> FsResult<usize> {
        self.with_file_data(handle, OpenOptions::WRITE, |data, open| {
            if open.opts.contains(OpenOptions::APPEND) {
                open.pos = data.len() as u64;
            }
            let pos = open.pos as usize;
            if pos > data.len() {
                data.resize(pos, 0);
            }
            let end = pos + buf.len();
            if end > data.len() {
                data.resize(end, 0);
            }
            data[pos..end].copy_from_slice(buf);
            open.pos = end as u64;
            Ok(buf.len())
        })
    }

    fn seek(&self, handle: FileHandle, from: SeekFrom) -> FsResult<u64> {
        let size = {
            let handles = self.handles.lock();
            let open = handles.get(&handle.raw()).ok_or(FsError::BadHandle)?;
            let root = self.root.lock();
            match Self::locate(&root, &open.path)? {
                Node::File { data, .. } => data.len() as u64,
                Node::Dir { .. } => return Err(FsError::IsDirectory),
            }
        };
        let mut handles = self.handles.lock();
        let open = handles.get_mut(&handle.raw()).ok_or(FsError::BadHandle)?;
        let new_pos = match from {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => open.pos.checked_add_signed(d),
            SeekFrom::End(d) => size.checked_add_signed(d),
        };
        match new_pos {
            Some(p) => {
                open.pos = p;
                Ok(p)
            }
            None => Err(FsError::InvalidArgument),
        }
    }

    fn close(&self, handle: FileHandle) -> FsResult<()> {
        self.handles
            .lock()
            .remove(&handle.raw())
            .map(|_| ())
            .ok_or(FsError::BadHandle)
    }

    fn stat(&self, raw_path: &str) -> FsResult<Metadata> {
        let p = path::normalize(raw_path)?;
        let root = self.root.lock();
        match Self::locate(&root, &p)? {
            Node::Dir { .. } => Ok(Metadata {
                kind: FileKind::Dir,
                size: 0,
            }),
            Node::File { data, .. } => Ok(Metadata {
                kind: FileKind::File,
                size: data.len() as u64,
            }),
        }
    }

    fn mkdir(&self, raw_path: &str) -> FsResult<()> {
        let p = path::normalize(raw_path)?;
        if p == "/" {
            return Err(FsError::AlreadyExists);
        }
        let mut root = self.root.lock();
        let (children, name) = Self::parent_mut(&mut root, &p)?;
        if children.contains_key(&name) {
            return Err(FsError::AlreadyExists);
        }
        children.insert(name, Node::empty_dir());
        Ok(())
    }

    fn read_dir(&self, raw_path: &str) -> FsResult<Vec<DirEntry>> {
        let p = path::normalize(raw_path)?;
        let root = self.root.lock();
        match Self::locate(&root, &p)? {
            Node::Dir { children, .. } => Ok(children
                .iter()
                .map(|(name, node)| DirEntry {
                    name: name.clone(),
                    kind: if node.is_dir() {
                        FileKind::Dir
                    } else {
                        FileKind::File
                    },
                    size: match node {
                        Node::File { data, .. } => data.len() as u64,
                        Node::Dir { .. } => 0,
                    },
                })
                .collect()),
            Node::File { .. } => Err(FsError::NotDirectory),
        }
    }

    fn rename(&self, raw_from: &str, raw_to: &str) -> FsResult<()> {
        let from = path::normalize(raw_from)?;
        let to = path::normalize(raw_to)?;
        if from == "/" || to == "/" {
            return Err(FsError::InvalidArgument);
        }
        // A directory cannot be moved into its own subtree.
        if to.starts_with(&from) && to.as_bytes().get(from.len()) == Some(&b'/') {
            return Err(FsError::InvalidArgument);
        }
        let mut root = self.root.lock();
        // Take the source out first; put it back on any later failure.
        let node = {
            let (children, name) = Self::parent_mut(&mut root, &from)?;
            children.remove(&name).ok_or(FsError::NotFound)?
        };
        let reinsert = |root: &mut Node, node: Node| {
            if let Ok((children, name)) = Self::parent_mut(root, &from) {
                children.insert(name, node);
            }
        };
        match Self::parent_mut(&mut root, &to) {
            Ok((children, name)) => {
                if children.contains_key(&name) {
                    let err = FsError::AlreadyExists;
                    drop(children);
                    reinsert(&mut root, node);
                    return Err(err);
                }
                children.insert(name, node);
                Ok(())
            }
            Err(e) => {
                reinsert(&mut root, node);
                Err(e)
            }
        }
    }

    fn remove(&self, raw_path: &str) -> FsResult<()> {
        let p = path::normalize(raw_path)?;
        if p == "/" {
            return Err(FsError::InvalidArgument);
        }
        let mut root = self.root.lock();
        {
            let target = Self::locate(&root, &p)?;
            if let Node::Dir { children, .. } = target {
                if !children.is_empty() {
                    return Err(FsError::NotEmpty);
                }
            }
        }
        let (children, name) = Self::parent_mut(&mut root, &p)?;
        children.remove(&name).ok_or(FsError::NotFound)?;
        Ok(())
    }

    fn get_attr(&self, raw_path: &str, key: &str) -> FsResult<Vec<u8>> {
        let p = path::normalize(raw_path)?;
        let root = self.root.lock();
        let node = Self::locate(&root, &p)?;
        node.attrs().get(key).cloned().ok_or(FsError::NotFound)
    }

    fn set_attr(&self, raw_path: &str, key: &str, value: &[u8]) -> FsResult<()> {
        let p = path::normalize(raw_path)?;
        let mut root = self.root.lock();
        let node = Self::locate_mut(&mut root, &p)?;
        node.attrs_mut().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove_attr(&self, raw_path: &str, key: &str) -> FsResult<()> {
        let p = path::normalize(raw_path)?;
        let mut root = self.root.lock();
        let node = Self::locate_mut(&mut root, &p)?;
        node.attrs_mut()
            .remove(key)
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{read_to_vec, write_all};

    #[test]
    fn create_write_read() {
        let fs = MemFs::new();
        write_all(&fs, "/hello.txt", b"Hello World").unwrap();
        assert_eq!(read_to_vec(&fs, "/hello.txt").unwrap(), b"Hello World");
        let meta = fs.stat("/hello.txt").unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.size, 11);
    }

    #[test]
    fn open_without_create_requires_existing_file() {
        let fs = MemFs::new();
        assert_eq!(
            fs.open("/missing", OpenOptions::read_only()),
            Err(FsError::NotFound)
        );
    }

    #[test]
    fn create_requires_parent_directory() {
        let fs = MemFs::new();
        assert_eq!(
            fs.open("/no/such/dir/f", OpenOptions::create_for_write()),
            Err(FsError::NotFound)
        );
    }

    #[test]
    fn mkdir_and_listing_order() {
        let fs = MemFs::new();
        fs.mkdir("/d").unwrap();
        write_all(&fs, "/d/b", b"2").unwrap();
        write_all(&fs, "/d/a", b"1").unwrap();
        fs.mkdir("/d/sub").unwrap();

        let entries = fs.read_dir("/d").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        // Lexical, deterministic.
        assert_eq!(names, ["a", "b", "sub"]);
        assert_eq!(entries[2].kind, FileKind::Dir);

        // Second snapshot visits the same order.
        let again = fs.read_dir("/d").unwrap();
        assert_eq!(entries, again);
    }

    #[test]
    fn remove_rejects_nonempty_dirs() {
        let fs = MemFs::new();
        fs.mkdir("/d").unwrap();
        write_all(&fs, "/d/f", b"x").unwrap();
        assert_eq!(fs.remove("/d"), Err(FsError::NotEmpty));
        fs.remove("/d/f").unwrap();
        fs.remove("/d").unwrap();
        assert_eq!(fs.stat("/d"), Err(FsError::NotFound));
    }

    #[test]
    fn rename_moves_subtrees() {
        let fs = MemFs::new();
        fs.mkdir("/stage").unwrap();
        write_all(&fs, "/stage/f", b"payload").unwrap();
        fs.rename("/stage", "/final").unwrap();
        assert_eq!(read_to_vec(&fs, "/final/f").unwrap(), b"payload");
        assert_eq!(fs.stat("/stage"), Err(FsError::NotFound));
    }

    #[test]
    fn rename_refuses_existing_target_and_own_subtree() {
        let fs = MemFs::new();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/b").unwrap();
        assert_eq!(fs.rename("/a", "/b"), Err(FsError::AlreadyExists));
        assert_eq!(fs.rename("/a", "/a/inside"), Err(FsError::InvalidArgument));
        // Source is still in place after the failed attempts.
        assert!(fs.stat("/a").unwrap().is_dir());
    }

    #[test]
    fn seek_and_sparse_write() {
        let fs = MemFs::new();
        let h = fs.open("/f", OpenOptions::create_for_write()).unwrap();
        fs.seek(h, SeekFrom::Start(4)).unwrap();
        fs.write(h, b"zz").unwrap();
        fs.close(h).unwrap();
        assert_eq!(read_to_vec(&fs, "/f").unwrap(), b"\0\0\0\0zz");
    }

    #[test]
    fn attrs_round_trip() {
        let fs = MemFs::new();
        write_all(&fs, "/f", b"").unwrap();
        fs.set_attr("/f", "owner", b"monitor").unwrap();
        assert_eq!(fs.get_attr("/f", "owner").unwrap(), b"monitor");
        fs.remove_attr("/f", "owner").unwrap();
        assert_eq!(fs.get_attr("/f", "owner"), Err(FsError::NotFound));
    }

    #[test]
    fn handles_are_single_use() {
        let fs = MemFs::new();
        write_all(&fs, "/f", b"x").unwrap();
        let h = fs.open("/f", OpenOptions::read_only()).unwrap();
        fs.close(h).unwrap();
        assert_eq!(fs.close(h), Err(FsError::BadHandle));
        let mut buf = [0u8; 1];
        assert_eq!(fs.read(h, &mut buf), Err(FsError::BadHandle));
    }

    #[test]
    fn write_requires_write_mode() {
        let fs = MemFs::new();
        write_all(&fs, "/f", b"x").unwrap();
        let h = fs.open("/f", OpenOptions::read_only()).unwrap();
        assert_eq!(fs.write(h, b"y"), Err(FsError::AccessMode));
        fs.close(h).unwrap();
    }
}
