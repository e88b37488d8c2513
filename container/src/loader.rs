//! The seam to the external code loader.

use core::fmt;

use corral_exec::TaskId;

/// Errors a loader may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The bytes are not a loadable program.
    BadImage,
    /// The loader refused the program (signature, architecture, ...).
    Rejected,
}

impl LoadError {
    pub const fn message(self) -> &'static str {
        match self {
            Self::BadImage => "not a loadable program",
            Self::Rejected => "program rejected by loader",
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// "Execute these bytes as a program in the current task context."
///
/// The real implementation (the flash ELF loader) lives outside this
/// repository; the container wrapper only ever calls through this trait.
/// `exec` returns when the program ends.
pub trait ProgramLoader: Send + Sync {
    fn exec(&self, image: &[u8], task: TaskId) -> Result<(), LoadError>;
}

/// Loader that accepts anything and returns immediately. Used by the
/// hosted profile, where there is no machine code to run.
pub struct NullLoader;

impl ProgramLoader for NullLoader {
    fn exec(&self, image: &[u8], task: TaskId) -> Result<(), LoadError> {
        log::debug!("null loader: {} bytes in task {}", image.len(), task);
        Ok(())
    }
}
