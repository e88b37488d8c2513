//! Error types for the isolation controllers.

use core::fmt;

use corral_exec::sync::SyncError;
use corral_exec::ExecError;

/// Result type alias for isolation operations.
pub type IsolationResult<T> = Result<T, IsolationError>;

/// Errors reported by the cgroup and namespace controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationError {
    /// No free slot in a fixed-size table.
    Capacity,
    /// Handle index does not name a slot.
    NotFound,
    /// Handle refers to a slot that was deleted (and possibly reused).
    StaleHandle,
    /// Task is already bound to a group or namespace.
    AlreadyBound,
    /// Task is not bound where the caller claimed.
    NotBound,
    /// Target still has members or registered objects.
    Busy,
    /// The root namespace cannot be deleted.
    RootNamespace,
    /// Empty or over-long name.
    InvalidName,
    /// Out-of-range argument (zero quota, oversized limit, ...).
    InvalidArgument,
    /// A duplicate registration was attempted.
    AlreadyExists,
    /// The caller's namespace does not grant access to the object.
    AccessDenied,
    /// Executive-level failure during a two-step operation.
    Exec(ExecError),
    /// Primitive-level failure forwarded by a guarded operation.
    Sync(SyncError),
}

impl IsolationError {
    pub const fn message(self) -> &'static str {
        match self {
            Self::Capacity => "no free slot",
            Self::NotFound => "no such handle",
            Self::StaleHandle => "stale handle",
            Self::AlreadyBound => "task already bound",
            Self::NotBound => "task not bound here",
            Self::Busy => "target not empty",
            Self::RootNamespace => "root namespace is permanent",
            Self::InvalidName => "invalid name",
            Self::InvalidArgument => "invalid argument",
            Self::AlreadyExists => "already registered",
            Self::AccessDenied => "access denied",
            Self::Exec(e) => e.message(),
            Self::Sync(e) => e.message(),
        }
    }
}

impl fmt::Display for IsolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl From<ExecError> for IsolationError {
    fn from(e: ExecError) -> Self {
        Self::Exec(e)
    }
}

impl From<SyncError> for IsolationError {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}
