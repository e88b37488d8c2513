//! Error types for executive operations.

use core::fmt;

/// Result type alias for executive operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors reported by an [`crate::Executive`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// The task handle does not name a live task.
    NoSuchTask,
    /// The executive cannot host another task.
    Capacity,
    /// A task name was empty or too long.
    InvalidName,
    /// The operation does not apply to the task's current state.
    InvalidState,
}

impl ExecError {
    /// Short human-readable message.
    pub const fn message(self) -> &'static str {
        match self {
            Self::NoSuchTask => "no such task",
            Self::Capacity => "task table full",
            Self::InvalidName => "invalid task name",
            Self::InvalidState => "invalid task state",
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
