//! Error types for the container subsystem.

use core::fmt;

use corral_exec::ExecError;
use corral_fs::FsError;
use corral_isolation::IsolationError;

use crate::loader::LoadError;

/// Result type alias for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors reported by the container manager and the image codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerError {
    /// The container table is full.
    Capacity,
    /// No container with that id (or name).
    NotFound,
    /// The operation is not legal in the container's current state.
    InvalidState,
    /// Empty or over-long container name.
    InvalidName,
    /// The container's working directory already exists.
    AlreadyExists,
    /// An image may hold at most 255 files.
    TooManyFiles,
    /// The image stream ended early or carried a malformed record.
    ImageCorrupt,
    /// Filesystem failure.
    Fs(FsError),
    /// Isolation-controller failure.
    Isolation(IsolationError),
    /// Executive failure.
    Exec(ExecError),
    /// Loader failure.
    Load(LoadError),
}

impl ContainerError {
    pub const fn message(self) -> &'static str {
        match self {
            Self::Capacity => "container table full",
            Self::NotFound => "no such container",
            Self::InvalidState => "invalid container state",
            Self::InvalidName => "invalid container name",
            Self::AlreadyExists => "container directory exists",
            Self::TooManyFiles => "too many files for one image",
            Self::ImageCorrupt => "corrupt image",
            Self::Fs(e) => e.message(),
            Self::Isolation(e) => e.message(),
            Self::Exec(e) => e.message(),
            Self::Load(e) => e.message(),
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl From<FsError> for ContainerError {
    fn from(e: FsError) -> Self {
        Self::Fs(e)
    }
}

impl From<IsolationError> for ContainerError {
    fn from(e: IsolationError) -> Self {
        Self::Isolation(e)
    }
}

impl From<ExecError> for ContainerError {
    fn from(e: ExecError) -> Self {
        Self::Exec(e)
    }
}

impl From<LoadError> for ContainerError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}
