//! # Per-task root routing ("chroot")
//!
//! Every path-bearing filesystem operation a task performs goes through
//! [`TaskFs`], which rewrites the caller's path against that task's root
//! and working directory before handing it to the store. Handle-based
//! operations (read/write/seek/close) are not rewritten — the path was
//! checked at open time.
//!
//! Tasks start with root `/` and cwd `/`; [`TaskFs::change_root`] narrows
//! the view after verifying the target directory exists. Entries are
//! per-task and must be dropped through the scheduler's task-delete hook.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use spin::RwLock;

use corral_exec::TaskId;

use crate::error::{FsError, FsResult};
use crate::path;
use crate::types::{DirEntry, FileHandle, Metadata, OpenOptions, SeekFrom};
use crate::vfs::Vfs;

#[derive(Clone)]
struct TaskPaths {
    /// Real path of the task's root directory. Normalized, absolute.
    root: String,
    /// Working directory as seen from inside the root.
    cwd: String,
}

impl TaskPaths {
    fn default_view() -> Self {
        Self {
            root: String::from("/"),
            cwd: String::from("/"),
        }
    }
}

/// Path router applying each task's root and working directory.
pub struct TaskFs {
    vfs: Arc<dyn Vfs>,
    table: RwLock<HashMap<TaskId, TaskPaths>>,
}

impl TaskFs {
    pub fn new(vfs: Arc<dyn Vfs>) -> Self {
        Self {
            vfs,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying store, for callers that operate on real paths.
    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    fn paths_for(&self, task: TaskId) -> TaskPaths {
        self.table
            .read()
            .get(&task)
            .cloned()
            .unwrap_or_else(TaskPaths::default_view)
    }

    /// Real path a task-supplied path resolves to.
    pub fn resolve(&self, task: TaskId, p: &str) -> FsResult<String> {
        let view = self.paths_for(task);
        path::resolve(&view.root, &view.cwd, p)
    }

    // ---- path-bearing operations (rewritten) --------------------------------

    pub fn open(&self, task: TaskId, p: &str, opts: OpenOptions) -> FsResult<FileHandle> {
        let real = self.resolve(task, p)?;
        self.vfs.open(&real, opts)
    }

    pub fn stat(&self, task: TaskId, p: &str) -> FsResult<Metadata> {
        let real = self.resolve(task, p)?;
        self.vfs.stat(&real)
    }

    pub fn mkdir(&self, task: TaskId, p: &str) -> FsResult<()> {
        let real = self.resolve(task, p)?;
        self.vfs.mkdir(&real)
    }

    pub fn read_dir(&self, task: TaskId, p: &str) -> FsResult<Vec<DirEntry>> {
        let real = self.resolve(task, p)?;
        self.vfs.read_dir(&real)
    }

    /// Rename: both paths are rewritten.
    pub fn rename(&self, task: TaskId, from: &str, to: &str) -> FsResult<()> {
        let real_from = self.resolve(task, from)?;
        let real_to = self.resolve(task, to)?;
        self.vfs.rename(&real_from, &real_to)
    }

    pub fn remove(&self, task: TaskId, p: &str) -> FsResult<()> {
        let real = self.resolve(task, p)?;
        self.vfs.remove(&real)
    }

    pub fn get_attr(&self, task: TaskId, p: &str, key: &str) -> FsResult<Vec<u8>> {
        let real = self.resolve(task, p)?;
        self.vfs.get_attr(&real, key)
    }

    pub fn set_attr(&self, task: TaskId, p: &str, key: &str, value: &[u8]) -> FsResult<()> {
        let real = self.resolve(task, p)?;
        self.vfs.set_attr(&real, key, value)
    }

    pub fn remove_attr(&self, task: TaskId, p: &str, key: &str) -> FsResult<()> {
        let real = self.resolve(task, p)?;
        self.vfs.remove_attr(&real, key)
    }

    // ---- handle-based operations (pass-through) -----------------------------

    pub fn read(&self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        self.vfs.read(handle, buf)
    }

    pub fn write(&self, handle: FileHandle, buf: &[u8]) -> FsResult<usize> {
        self.vfs.write(handle, buf)
    }

    pub fn seek(&self, handle: FileHandle, from: SeekFrom) -> FsResult<u64> {
        self.vfs.seek(handle, from)
    }

    pub fn close(&self, handle: FileHandle) -> FsResult<()> {
        self.vfs.close(handle)
    }

    // ---- view management ----------------------------------------------------

    /// Change the task's root. Unlike the data operations, the target is
    /// a raw absolute path — it is not routed through the current root,
    /// so a management task can move between jails (this subsystem
    /// isolates for correctness, it is not a sandbox against hostile
    /// code). The target must be an existing directory; the working
    /// directory resets to the new root.
    pub fn change_root(&self, task: TaskId, p: &str) -> FsResult<()> {
        if !p.starts_with('/') {
            return Err(FsError::InvalidPath);
        }
        let real = path::normalize(p)?;
        if !self.vfs.stat(&real)?.is_dir() {
            return Err(FsError::NotDirectory);
        }
        let mut table = self.table.write();
        let entry = table.entry(task).or_insert_with(TaskPaths::default_view);
        entry.root = real;
        entry.cwd = String::from("/");
        log::debug!("task {} chroot to {}", task, entry.root);
        Ok(())
    }

    /// Change the task's working directory (inside its root).
    pub fn chdir(&self, task: TaskId, p: &str) -> FsResult<()> {
        let view = self.paths_for(task);
        let inner = if p.starts_with('/') {
            path::normalize(p)?
        } else {
            let mut joined = String::from(view.cwd.as_str());
            joined.push('/');
            joined.push_str(p);
            path::normalize(&joined)?
        };
        let real = path::join_under(&view.root, &inner);
        if !self.vfs.stat(&real)?.is_dir() {
            return Err(FsError::NotDirectory);
        }
        let mut table = self.table.write();
        let entry = table.entry(task).or_insert_with(TaskPaths::default_view);
        entry.cwd = inner;
        Ok(())
    }

    /// The task's working directory as the task sees it.
    pub fn cwd(&self, task: TaskId) -> String {
        self.paths_for(task).cwd
    }

    /// The task's root as a real path.
    pub fn root(&self, task: TaskId) -> String {
        self.paths_for(task).root
    }

    /// Drop a task's view. Called from the task-delete hook.
    pub fn drop_task(&self, task: TaskId) {
        self.table.write().remove(&task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::MemFs;
    use crate::vfs::{read_to_vec, write_all};

    fn rig() -> (Arc<MemFs>, TaskFs) {
        let fs = Arc::new(MemFs::new());
        let tfs = TaskFs::new(fs.clone());
        (fs, tfs)
    }

    #[test]
    fn chroot_narrows_visibility() {
        let (fs, tfs) = rig();
        let task = TaskId::new(1);

        write_all(fs.as_ref(), "/test.txt", b"Hello World").unwrap();
        fs.mkdir("/tmp").unwrap();

        // Visible before the chroot.
        assert_eq!(tfs.stat(task, "/test.txt").unwrap().size, 11);

        tfs.change_root(task, "/tmp").unwrap();
        assert_eq!(tfs.stat(task, "/test.txt"), Err(FsError::NotFound));

        // Back to the real root; content unchanged.
        tfs.change_root(task, "/").unwrap();
        let h = tfs.open(task, "/test.txt", OpenOptions::read_only()).unwrap();
        let mut buf = [0u8; 16];
        let n = tfs.read(h, &mut buf).unwrap();
        tfs.close(h).unwrap();
        assert_eq!(&buf[..n], b"Hello World");
    }

    #[test]
    fn change_root_takes_raw_absolute_paths() {
        let (fs, tfs) = rig();
        let task = TaskId::new(1);
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();

        tfs.change_root(task, "/a").unwrap();
        // Not routed through the current root: "/a/b" means the real
        // "/a/b", and a relative target is rejected outright.
        tfs.change_root(task, "/a/b").unwrap();
        assert_eq!(tfs.root(task), "/a/b");
        assert_eq!(tfs.change_root(task, "b"), Err(FsError::InvalidPath));

        // A management task can always chroot back out.
        tfs.change_root(task, "/").unwrap();
        assert_eq!(tfs.root(task), "/");
    }

    #[test]
    fn change_root_requires_existing_directory() {
        let (fs, tfs) = rig();
        let task = TaskId::new(1);
        write_all(fs.as_ref(), "/file", b"x").unwrap();
        assert_eq!(tfs.change_root(task, "/missing"), Err(FsError::NotFound));
        assert_eq!(tfs.change_root(task, "/file"), Err(FsError::NotDirectory));
        assert_eq!(tfs.root(task), "/");
    }

    #[test]
    fn dotdot_cannot_escape_the_root() {
        let (fs, tfs) = rig();
        let task = TaskId::new(1);
        write_all(fs.as_ref(), "/secret", b"top").unwrap();
        fs.mkdir("/jail").unwrap();
        write_all(fs.as_ref(), "/jail/inside", b"ok").unwrap();

        tfs.change_root(task, "/jail").unwrap();
        assert_eq!(tfs.stat(task, "/../secret"), Err(FsError::NotFound));
        assert_eq!(tfs.stat(task, "../../secret"), Err(FsError::NotFound));
        assert_eq!(tfs.stat(task, "/inside").unwrap().size, 2);
    }

    #[test]
    fn cwd_is_task_visible_and_resolves_relative_paths() {
        let (fs, tfs) = rig();
        let task = TaskId::new(1);
        fs.mkdir("/jail").unwrap();
        fs.mkdir("/jail/work").unwrap();
        write_all(fs.as_ref(), "/jail/work/data", b"123").unwrap();

        tfs.change_root(task, "/jail").unwrap();
        assert_eq!(tfs.cwd(task), "/");
        tfs.chdir(task, "work").unwrap();
        assert_eq!(tfs.cwd(task), "/work");
        assert_eq!(tfs.stat(task, "data").unwrap().size, 3);
        assert_eq!(tfs.resolve(task, "data").unwrap(), "/jail/work/data");
    }

    #[test]
    fn rename_rewrites_both_paths() {
        let (fs, tfs) = rig();
        let task = TaskId::new(1);
        fs.mkdir("/jail").unwrap();
        write_all(fs.as_ref(), "/jail/a", b"x").unwrap();

        tfs.change_root(task, "/jail").unwrap();
        tfs.rename(task, "/a", "/b").unwrap();
        assert_eq!(read_to_vec(fs.as_ref(), "/jail/b").unwrap(), b"x");
    }

    #[test]
    fn views_are_independent_and_dropped() {
        let (fs, tfs) = rig();
        let a = TaskId::new(1);
        let b = TaskId::new(2);
        fs.mkdir("/jail").unwrap();

        tfs.change_root(a, "/jail").unwrap();
        assert_eq!(tfs.root(a), "/jail");
        assert_eq!(tfs.root(b), "/");

        tfs.drop_task(a);
        assert_eq!(tfs.root(a), "/");
    }
}
