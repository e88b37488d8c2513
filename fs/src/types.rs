//! Fundamental types of the storage seam.

use alloc::string::String;
use core::fmt;

/// Maximum length of an absolute path, in bytes.
pub const MAX_PATH: usize = 256;

/// Handle to an open file.
///
/// Handle 0 is reserved as invalid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct FileHandle(pub u64);

impl FileHandle {
    pub const INVALID: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fh({})", self.0)
    }
}

bitflags::bitflags! {
    /// Open configuration for [`crate::Vfs::open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenOptions: u32 {
        const READ     = 0b0_0001;
        const WRITE    = 0b0_0010;
        const CREATE   = 0b0_0100;
        const TRUNCATE = 0b0_1000;
        const APPEND   = 0b1_0000;
    }
}

impl OpenOptions {
    /// Read-only open.
    pub const fn read_only() -> Self {
        Self::READ
    }

    /// Create-or-truncate for writing.
    pub const fn create_for_write() -> Self {
        Self::WRITE.union(Self::CREATE).union(Self::TRUNCATE)
    }
}

/// Kind of a directory entry or stat target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
}

/// Stat result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub kind: FileKind,
    pub size: u64,
}

impl Metadata {
    #[inline]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, FileKind::Dir)
    }

    #[inline]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, FileKind::File)
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
}

/// Seek origin for [`crate::Vfs::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}
