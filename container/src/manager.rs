//! # Container manager
//!
//! Owns the container list and composes the isolation controllers, the
//! filesystem, and the loader into the container lifecycle.
//!
//! Construction is dependency-ordered and all-or-nothing: cgroup, PID
//! namespace, IPC namespace, then the image unpack; the first failure
//! unwinds everything already built. Start spawns the wrapper task
//! inside the PID namespace, joins it to the cgroup, and only then
//! releases the startup gate, so the task observes its full isolation
//! before user code runs.
//!
//! One mutex guards the list and the id counter; ids are monotonic and
//! never reused, even across failed creates.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use arrayvec::ArrayString;
use spin::Mutex;

use corral_exec::gate::startup_gate;
use corral_exec::{Executive, TaskSpec};
use corral_fs::{TaskFs, Vfs};
use corral_isolation::{CGroupStats, IsolationHooks};

use crate::container::{Container, ContainerInfo, ContainerState};
use crate::error::{ContainerError, ContainerResult};
use crate::image;
use crate::loader::ProgramLoader;
use crate::wrapper::{self, WrapperParams};

/// Maximum simultaneous containers.
pub const MAX_CONTAINERS: usize = 16;

// Every container consumes one cgroup slot and one namespace slot of
// each kind; the namespaces also hold their permanent root.
static_assertions::const_assert!(MAX_CONTAINERS <= corral_isolation::config::MAX_CGROUPS);
static_assertions::const_assert!(MAX_CONTAINERS < corral_isolation::config::MAX_PID_NAMESPACES);
static_assertions::const_assert!(MAX_CONTAINERS < corral_isolation::config::MAX_IPC_NAMESPACES);

/// Parent of every container working directory.
pub const CONTAINER_ROOT: &str = "/var/container";

/// The canonical image store.
pub const IMAGE_DIR: &str = "/var/container/images";

struct ManagerInner {
    containers: Vec<Container>,
    next_id: u64,
}

/// The container manager.
pub struct ContainerManager {
    pub(crate) exec: Arc<dyn Executive>,
    pub(crate) taskfs: Arc<TaskFs>,
    pub(crate) hooks: IsolationHooks,
    pub(crate) loader: Arc<dyn ProgramLoader>,
    inner: Mutex<ManagerInner>,
}

impl ContainerManager {
    /// Build the manager and install the task-delete teardown (isolation
    /// bindings plus the per-task filesystem view) with the executive.
    pub fn new(
        exec: Arc<dyn Executive>,
        taskfs: Arc<TaskFs>,
        hooks: IsolationHooks,
        loader: Arc<dyn ProgramLoader>,
    ) -> Arc<Self> {
        hooks.install();
        let fs_hook = Arc::clone(&taskfs);
        exec.add_delete_hook(alloc::boxed::Box::new(move |task| fs_hook.drop_task(task)));
        Arc::new(Self {
            exec,
            taskfs,
            hooks,
            loader,
            inner: Mutex::new(ManagerInner {
                containers: Vec::new(),
                next_id: 1,
            }),
        })
    }

    fn vfs(&self) -> &dyn Vfs {
        self.taskfs.vfs().as_ref()
    }

    /// Working directory of a container id.
    pub fn root_dir_for(id: u64) -> String {
        format!("{}/{}", CONTAINER_ROOT, id)
    }

    fn stage_dir_for(id: u64) -> String {
        format!("{}/.stage-{}", CONTAINER_ROOT, id)
    }

    /// Create a container: cgroup, PID namespace, IPC namespace, then
    /// unpack `image` (a name in the image store) into the fresh working
    /// directory. Returns the new container's id.
    pub fn create(
        &self,
        name: &str,
        image: &str,
        program: &str,
        mem_limit: usize,
        cpu_quota: u32,
    ) -> ContainerResult<u64> {
        if name.is_empty() || program.is_empty() || image.is_empty() {
            return Err(ContainerError::InvalidName);
        }
        let cname: ArrayString<{ corral_exec::MAX_NAME }> =
            ArrayString::from(name).map_err(|_| ContainerError::InvalidName)?;

        let mut inner = self.inner.lock();
        if inner.containers.len() >= MAX_CONTAINERS {
            return Err(ContainerError::Capacity);
        }
        // Ids advance even when a later step fails: never reused.
        let id = inner.next_id;
        inner.next_id += 1;

        let cgroup = self
            .hooks
            .cgroups
            .create(name, mem_limit, cpu_quota, self.exec.now())?;
        let pid_ns = match self.hooks.pidns.create(name) {
            Ok(ns) => ns,
            Err(e) => {
                self.unwind(Some(cgroup), None, None, None);
                return Err(e.into());
            }
        };
        let ipc_ns = match self.hooks.ipcns.create(name) {
            Ok(ns) => ns,
            Err(e) => {
                self.unwind(Some(cgroup), Some(pid_ns), None, None);
                return Err(e.into());
            }
        };

        let root_dir = Self::root_dir_for(id);
        let image_path = format!("{}/{}", IMAGE_DIR, image);
        if let Err(e) = image::unpack(self.vfs(), &image_path, &root_dir, &Self::stage_dir_for(id))
        {
            self.unwind(Some(cgroup), Some(pid_ns), Some(ipc_ns), None);
            return Err(e);
        }

        inner.containers.push(Container {
            id,
            name: cname,
            state: ContainerState::Stopped,
            task: None,
            image: image.to_string(),
            program: program.to_string(),
            root_dir,
            cgroup,
            pid_ns,
            ipc_ns,
            mem_limit,
            cpu_quota,
        });
        log::info!("container {} '{}' created from {}", id, name, image);
        Ok(id)
    }

    /// Start a STOPPED container: spawn the wrapper inside the PID
    /// namespace, join it to the cgroup, then release the startup gate.
    pub fn start(self: &Arc<Self>, id: u64) -> ContainerResult<()> {
        let mut inner = self.inner.lock();
        let container = find_mut(&mut inner.containers, id)?;
        if container.state != ContainerState::Stopped {
            return Err(ContainerError::InvalidState);
        }

        let (gate_tx, gate_rx) = startup_gate();
        let params = WrapperParams {
            container_id: container.id,
            root_dir: container.root_dir.clone(),
            program: container.program.clone(),
            cgroup: container.cgroup,
            pid_ns: container.pid_ns,
            ipc_ns: container.ipc_ns,
        };
        let mgr = Arc::clone(self);
        let spec = TaskSpec {
            name: container.name,
            priority: corral_exec::DEFAULT_PRIORITY,
            entry: alloc::boxed::Box::new(move |task| wrapper::run(mgr, params, gate_rx, task)),
        };

        let (task, vpid) = self
            .hooks
            .pidns
            .spawn_in(self.exec.as_ref(), container.pid_ns, spec)?;
        if let Err(e) = self.hooks.cgroups.add_task(container.cgroup, task) {
            // The delete hook unwinds the PID-namespace binding.
            let _ = self.exec.kill(task);
            return Err(e.into());
        }

        container.task = Some(task);
        container.state = ContainerState::Running;
        log::info!("container {} started (task {}, vpid {})", id, task, vpid);
        drop(inner);
        // Released only after the cgroup join: the wrapper wakes to a
        // fully wired container. Outside the list lock, since the wrapper
        // may take it on its error path.
        gate_tx.release();
        Ok(())
    }

    /// Stop a RUNNING (or PAUSED) container and delete its task.
    /// Stopping an already-stopped container is a caller error.
    pub fn stop(&self, id: u64) -> ContainerResult<()> {
        let mut inner = self.inner.lock();
        let container = find_mut(&mut inner.containers, id)?;
        Self::stop_locked(self.exec.as_ref(), container)
    }

    fn stop_locked(exec: &dyn Executive, container: &mut Container) -> ContainerResult<()> {
        match container.state {
            ContainerState::Running | ContainerState::Paused => {}
            _ => return Err(ContainerError::InvalidState),
        }
        if let Some(task) = container.task.take() {
            // Kill fires the delete hooks, clearing every binding.
            if let Err(e) = exec.kill(task) {
                log::warn!("container {}: task {} already gone: {}", container.id, task, e);
            }
        }
        container.state = ContainerState::Stopped;
        log::info!("container {} stopped", container.id);
        Ok(())
    }

    /// Suspend a RUNNING container's task.
    pub fn pause(&self, id: u64) -> ContainerResult<()> {
        let mut inner = self.inner.lock();
        let container = find_mut(&mut inner.containers, id)?;
        if container.state != ContainerState::Running {
            return Err(ContainerError::InvalidState);
        }
        let Some(task) = container.task else {
            return Err(ContainerError::InvalidState);
        };
        self.exec.suspend(task)?;
        container.state = ContainerState::Paused;
        log::info!("container {} paused", id);
        Ok(())
    }

    /// Resume a PAUSED container's task.
    pub fn resume(&self, id: u64) -> ContainerResult<()> {
        let mut inner = self.inner.lock();
        let container = find_mut(&mut inner.containers, id)?;
        if container.state != ContainerState::Paused {
            return Err(ContainerError::InvalidState);
        }
        let Some(task) = container.task else {
            return Err(ContainerError::InvalidState);
        };
        self.exec.resume(task)?;
        container.state = ContainerState::Running;
        log::info!("container {} resumed", id);
        Ok(())
    }

    /// Delete a container: stop it if needed, detach it from the list,
    /// tear down its resources, and remove its working directory. The
    /// image store is untouched.
    pub fn delete(&self, id: u64) -> ContainerResult<()> {
        let container = {
            let mut inner = self.inner.lock();
            let index = inner
                .containers
                .iter()
                .position(|c| c.id == id)
                .ok_or(ContainerError::NotFound)?;
            if matches!(
                inner.containers[index].state,
                ContainerState::Running | ContainerState::Paused
            ) {
                Self::stop_locked(self.exec.as_ref(), &mut inner.containers[index])?;
            }
            inner.containers.swap_remove(index)
        };

        self.unwind(
            Some(container.cgroup),
            Some(container.pid_ns),
            Some(container.ipc_ns),
            Some(&container.root_dir),
        );
        log::info!("container {} deleted", id);
        Ok(())
    }

    /// Reverse-order teardown shared by failed creates and deletes.
    fn unwind(
        &self,
        cgroup: Option<corral_isolation::CGroupId>,
        pid_ns: Option<corral_isolation::PidNsId>,
        ipc_ns: Option<corral_isolation::IpcNsId>,
        root_dir: Option<&str>,
    ) {
        if let Some(ns) = ipc_ns {
            match self.hooks.ipcns.unregister_all(ns) {
                Ok(0) => {}
                Ok(n) => log::debug!("ipc namespace {:?}: {} objects unregistered", ns, n),
                Err(e) => log::warn!("ipc namespace {:?}: purge failed: {}", ns, e),
            }
            if let Err(e) = self.hooks.ipcns.delete(ns) {
                log::warn!("ipc namespace {:?} not deleted: {}", ns, e);
            }
        }
        if let Some(ns) = pid_ns {
            if let Err(e) = self.hooks.pidns.delete(ns) {
                log::warn!("pid namespace {:?} not deleted: {}", ns, e);
            }
        }
        if let Some(cg) = cgroup {
            if let Err(e) = self.hooks.cgroups.delete(cg) {
                log::warn!("cgroup {:?} not deleted: {}", cg, e);
            }
        }
        if let Some(dir) = root_dir {
            if let Err(e) = image::remove_tree(self.vfs(), dir) {
                log::warn!("container directory {} not removed: {}", dir, e);
            }
        }
    }

    /// Flip ERROR on a container; used by the wrapper on verification or
    /// loader failure. The task is ending on its own.
    pub(crate) fn mark_error(&self, id: u64) {
        let mut inner = self.inner.lock();
        if let Ok(container) = find_mut(&mut inner.containers, id) {
            container.state = ContainerState::Error;
            container.task = None;
        }
    }

    /// Reconciliation pass: a RUNNING or PAUSED container whose task has
    /// exited becomes STOPPED. Establishes `state == RUNNING` iff the
    /// underlying task is alive.
    pub fn reconcile(&self) {
        let mut inner = self.inner.lock();
        for container in inner.containers.iter_mut() {
            if matches!(
                container.state,
                ContainerState::Running | ContainerState::Paused
            ) {
                let alive = container
                    .task
                    .is_some_and(|task| self.exec.is_alive(task));
                if !alive {
                    log::info!("container {}: task exited, now stopped", container.id);
                    container.task = None;
                    container.state = ContainerState::Stopped;
                }
            }
        }
    }

    /// Snapshot of every container, in id order.
    pub fn list(&self) -> Vec<ContainerInfo> {
        let inner = self.inner.lock();
        let mut infos: Vec<ContainerInfo> = inner.containers.iter().map(Container::info).collect();
        infos.sort_unstable_by_key(|c| c.id);
        infos
    }

    /// Snapshot of one container.
    pub fn get(&self, id: u64) -> ContainerResult<ContainerInfo> {
        let inner = self.inner.lock();
        inner
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(Container::info)
            .ok_or(ContainerError::NotFound)
    }

    /// Exact-match lookup by display name.
    pub fn get_by_name(&self, name: &str) -> ContainerResult<ContainerInfo> {
        let inner = self.inner.lock();
        inner
            .containers
            .iter()
            .find(|c| c.name.as_str() == name)
            .map(Container::info)
            .ok_or(ContainerError::NotFound)
    }

    /// The container's cgroup accounting snapshot.
    pub fn stats(&self, id: u64) -> ContainerResult<CGroupStats> {
        let cgroup = {
            let inner = self.inner.lock();
            inner
                .containers
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.cgroup)
                .ok_or(ContainerError::NotFound)?
        };
        Ok(self.hooks.cgroups.stats(cgroup)?)
    }

    /// Number of containers currently in the list.
    pub fn count(&self) -> usize {
        self.inner.lock().containers.len()
    }
}

fn find_mut(containers: &mut [Container], id: u64) -> ContainerResult<&mut Container> {
    containers
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or(ContainerError::NotFound)
}
