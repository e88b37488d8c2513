//! Error types and result handling for filesystem operations.

use core::fmt;

/// Result type alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Error type covering the failure modes of the storage seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FsError {
    /// Generic I/O error from the flash layer.
    Io              = 1,
    /// No such file or directory.
    NotFound        = 2,
    /// File or directory already exists.
    AlreadyExists   = 3,
    /// Path component is not a directory.
    NotDirectory    = 4,
    /// Directory found where a file was expected.
    IsDirectory     = 5,
    /// Directory not empty.
    NotEmpty        = 6,
    /// Malformed or unresolvable path.
    InvalidPath     = 7,
    /// Path or name exceeds the configured maximum.
    NameTooLong     = 8,
    /// Handle does not name an open file.
    BadHandle       = 9,
    /// No space left on the device.
    NoSpace         = 10,
    /// Open-file table is full.
    TooManyOpenFiles = 11,
    /// Invalid argument (seek before start, bad open mode, ...).
    InvalidArgument = 12,
    /// Operation requires an access mode the handle was not opened with.
    AccessMode      = 13,
}

impl FsError {
    /// Convert to an errno-compatible value for the command surface.
    pub const fn to_errno(self) -> i32 {
        match self {
            Self::Io => 5,                // EIO
            Self::NotFound => 2,          // ENOENT
            Self::AlreadyExists => 17,    // EEXIST
            Self::NotDirectory => 20,     // ENOTDIR
            Self::IsDirectory => 21,      // EISDIR
            Self::NotEmpty => 39,         // ENOTEMPTY
            Self::InvalidPath => 22,      // EINVAL
            Self::NameTooLong => 36,      // ENAMETOOLONG
            Self::BadHandle => 9,         // EBADF
            Self::NoSpace => 28,          // ENOSPC
            Self::TooManyOpenFiles => 24, // EMFILE
            Self::InvalidArgument => 22,  // EINVAL
            Self::AccessMode => 13,       // EACCES
        }
    }

    /// Short human-readable message.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Io => "I/O error",
            Self::NotFound => "no such file or directory",
            Self::AlreadyExists => "file exists",
            Self::NotDirectory => "not a directory",
            Self::IsDirectory => "is a directory",
            Self::NotEmpty => "directory not empty",
            Self::InvalidPath => "invalid path",
            Self::NameTooLong => "name too long",
            Self::BadHandle => "bad file handle",
            Self::NoSpace => "no space left on device",
            Self::TooManyOpenFiles => "too many open files",
            Self::InvalidArgument => "invalid argument",
            Self::AccessMode => "access mode mismatch",
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_covers_posix_basics() {
        assert_eq!(FsError::NotFound.to_errno(), 2);
        assert_eq!(FsError::AlreadyExists.to_errno(), 17);
        assert_eq!(FsError::NotEmpty.to_errno(), 39);
    }
}
