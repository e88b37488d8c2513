//! # corral-fs
//!
//! The filesystem as the container subsystem sees it.
//!
//! The flash storage layer and the on-media filesystem live outside this
//! repository; the [`Vfs`] trait captures what corral needs from them: a
//! path-addressed byte store with directories, sequential file I/O,
//! rename/remove, and extended attributes.
//!
//! On top of that seam this crate provides the part that *is* corral's:
//! [`chroot::TaskFs`], the per-task root-path router. Every path-bearing
//! operation a task performs is rewritten against the task's root and
//! working directory before it reaches the store; handle-based operations
//! pass through untouched. [`memfs::MemFs`] is a complete in-memory store
//! used by the test suites and the simulation profile.

#![no_std]

extern crate alloc;

pub mod chroot;
pub mod error;
pub mod memfs;
pub mod path;
pub mod types;
pub mod vfs;

pub use chroot::TaskFs;
pub use error::{FsError, FsResult};
pub use memfs::MemFs;
pub use types::{DirEntry, FileHandle, FileKind, Metadata, OpenOptions, SeekFrom, MAX_PATH};
pub use vfs::Vfs;
