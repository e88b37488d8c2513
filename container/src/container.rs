//! Container record and state machine.

use alloc::string::String;
use core::fmt;

use arrayvec::ArrayString;

use corral_exec::{TaskId, MAX_NAME};
use corral_isolation::{CGroupId, IpcNsId, PidNsId};

/// Lifecycle state of a container.
///
/// Legal transitions: STOPPED→RUNNING (start), RUNNING→STOPPED (stop or
/// task completion), RUNNING↔PAUSED (pause/resume), PAUSED→STOPPED
/// (stop), any→ERROR (isolation verification or loader failure), and
/// {STOPPED, ERROR}→deleted. Everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Stopped,
    Running,
    Paused,
    Error,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// One container: a task plus its three resource handles and its
/// filesystem root.
pub(crate) struct Container {
    /// Monotonic id; never reused within a process lifetime.
    pub id: u64,
    pub name: ArrayString<MAX_NAME>,
    pub state: ContainerState,
    /// Non-null exactly while RUNNING or PAUSED.
    pub task: Option<TaskId>,
    /// Name of the image the container was unpacked from.
    pub image: String,
    /// Program (inside the image) started by the wrapper.
    pub program: String,
    /// Real path of the working directory; becomes the task's root.
    pub root_dir: String,
    pub cgroup: CGroupId,
    pub pid_ns: PidNsId,
    pub ipc_ns: IpcNsId,
    pub mem_limit: usize,
    /// Ticks per window.
    pub cpu_quota: u32,
}

/// Public snapshot of a container, as listed by the command surface.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: u64,
    pub name: ArrayString<MAX_NAME>,
    pub state: ContainerState,
    pub task: Option<TaskId>,
    pub image: String,
    pub mem_limit: usize,
    pub cpu_quota: u32,
}

impl Container {
    pub(crate) fn info(&self) -> ContainerInfo {
        ContainerInfo {
            id: self.id,
            name: self.name,
            state: self.state,
            task: self.task,
            image: self.image.clone(),
            mem_limit: self.mem_limit,
            cpu_quota: self.cpu_quota,
        }
    }
}
