//! Command dispatch.

use alloc::sync::Arc;
use core::fmt::{self, Write};

use corral_container::{ContainerManager, ProgramLoader};
use corral_exec::TaskId;
use corral_fs::TaskFs;

use crate::{container_cmds, fs_cmds};

/// Rows per page of `container-ls` output.
pub const LS_PAGE: usize = 8;

/// Two-valued command status. Detail text goes to the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdError {
    /// Bad arguments; usage was written to the buffer.
    Usage,
    /// The operation failed; the reason was written to the buffer.
    Failed,
}

impl fmt::Display for CmdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage => write!(f, "usage error"),
            Self::Failed => write!(f, "command failed"),
        }
    }
}

/// Result type alias for command handlers.
pub type CmdResult = Result<(), CmdError>;

/// The command surface, bound to one manager and one filesystem view.
pub struct Shell {
    pub(crate) mgr: Arc<ContainerManager>,
    pub(crate) taskfs: Arc<TaskFs>,
    pub(crate) loader: Arc<dyn ProgramLoader>,
}

impl Shell {
    pub fn new(
        mgr: Arc<ContainerManager>,
        taskfs: Arc<TaskFs>,
        loader: Arc<dyn ProgramLoader>,
    ) -> Self {
        Self {
            mgr,
            taskfs,
            loader,
        }
    }

    /// Run one tokenized command in `task`'s context, writing output and
    /// error detail to `out`.
    pub fn dispatch(&self, task: TaskId, argv: &[&str], out: &mut dyn Write) -> CmdResult {
        let Some((&cmd, args)) = argv.split_first() else {
            return Err(CmdError::Usage);
        };
        log::debug!("task {} runs {}", task, cmd);
        match cmd {
            "container-create" => container_cmds::create(self, args, out),
            "container-ls" => container_cmds::ls(self, args, out),
            "container-start" => container_cmds::start(self, args, out),
            "container-stop" => container_cmds::stop(self, args, out),
            "container-delete" => container_cmds::delete(self, args, out),
            "container-run" => container_cmds::run(self, args, out),
            "container-load" => container_cmds::load(self, task, args, out),
            "container-save" => container_cmds::save(self, task, args, out),
            "container-image" => container_cmds::images(self, args, out),
            "run" => fs_cmds::run(self, task, args, out),
            "ls" => fs_cmds::ls(self, task, args, out),
            "pwd" => fs_cmds::pwd(self, task, args, out),
            other => {
                let _ = writeln!(out, "unknown command: {}", other);
                Err(CmdError::Failed)
            }
        }
    }
}

/// Emit a usage line and return the usage status.
pub(crate) fn usage(out: &mut dyn Write, text: &str) -> CmdResult {
    let _ = writeln!(out, "usage: {}", text);
    Err(CmdError::Usage)
}

/// Emit a failure line and return the failed status.
pub(crate) fn fail(out: &mut dyn Write, err: impl fmt::Display) -> CmdResult {
    let _ = writeln!(out, "error: {}", err);
    Err(CmdError::Failed)
}
