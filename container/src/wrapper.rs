//! The container task wrapper.
//!
//! Every container task starts here. The wrapper parks on the startup
//! gate until the manager has finished wiring the isolation, then
//! applies what must be applied from the task's own context (the IPC
//! namespace binding), re-verifies the memberships the manager set up,
//! chroots into the container directory, reads the program bytes
//! through the now-narrowed view, and hands them to the loader.
//!
//! Verification failure is a construction-path bug surfacing late: the
//! container goes to ERROR and the task ends *before* any chroot or
//! loader invocation.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use corral_exec::gate::GateReceiver;
use corral_exec::{TaskId, Tick};
use corral_fs::{FsError, OpenOptions};
use corral_isolation::{CGroupId, IpcNsId, PidNsId};

use crate::loader::ProgramLoader;
use crate::manager::ContainerManager;

/// How long a wrapper will park on its startup gate before giving up.
pub(crate) const STARTUP_GATE_TICKS: Tick = 1_000;

pub(crate) struct WrapperParams {
    pub container_id: u64,
    pub root_dir: String,
    pub program: String,
    pub cgroup: CGroupId,
    pub pid_ns: PidNsId,
    pub ipc_ns: IpcNsId,
}

pub(crate) fn run(
    mgr: Arc<ContainerManager>,
    params: WrapperParams,
    gate: GateReceiver,
    task: TaskId,
) {
    let id = params.container_id;

    if gate.wait(mgr.exec.as_ref(), STARTUP_GATE_TICKS).is_err() {
        log::error!("container {}: startup gate never released", id);
        mgr.mark_error(id);
        return;
    }

    // The IPC namespace must be applied from the task's own context.
    if let Err(e) = mgr.hooks.ipcns.bind_task(task, params.ipc_ns) {
        log::error!("container {}: ipc namespace bind failed: {}", id, e);
        mgr.mark_error(id);
        return;
    }

    // Re-verify what the manager wired before this task was released.
    let cgroup_ok = mgr.hooks.cgroups.group_of(task) == Some(params.cgroup);
    let pidns_ok = mgr.hooks.pidns.namespace_of(task) == params.pid_ns
        && mgr.hooks.pidns.vpid_of(task) != 0;
    if !cgroup_ok || !pidns_ok {
        log::error!(
            "container {}: isolation verification failed (cgroup {}, pidns {})",
            id,
            cgroup_ok,
            pidns_ok
        );
        mgr.mark_error(id);
        return;
    }

    if let Err(e) = mgr.taskfs.change_root(task, &params.root_dir) {
        log::error!("container {}: chroot into {} failed: {}", id, params.root_dir, e);
        mgr.mark_error(id);
        return;
    }

    // From here every path is container-relative.
    let mut program = String::from("/");
    program.push_str(params.program.trim_start_matches('/'));
    let bytes = match read_program(&mgr, task, &program) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("container {}: cannot read program {}: {}", id, program, e);
            mgr.mark_error(id);
            return;
        }
    };

    if let Err(e) = mgr.loader.exec(&bytes, task) {
        log::error!("container {}: loader rejected {}: {}", id, program, e);
        mgr.mark_error(id);
        return;
    }

    // Program finished; the reconciliation pass flips RUNNING -> STOPPED.
    log::info!("container {}: program {} completed", id, program);
}

/// Read a file through the task's (chrooted) view.
fn read_program(mgr: &ContainerManager, task: TaskId, p: &str) -> Result<Vec<u8>, FsError> {
    let handle = mgr.taskfs.open(task, p, OpenOptions::read_only())?;
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    let result = loop {
        match mgr.taskfs.read(handle, &mut chunk) {
            Ok(0) => break Ok(()),
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) => break Err(e),
        }
    };
    mgr.taskfs.close(handle)?;
    result.map(|()| out)
}
