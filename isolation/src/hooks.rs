//! # Scheduler hook bundle
//!
//! The entry points the host scheduler drives: one per tick, one per
//! task switch-out, an admission query at dispatch, and the task-delete
//! teardown. All cgroup and namespace accounting flows through these
//! four calls; there is no queued backlog applied across switches — the
//! tick hook charges whichever task the scheduler reports as current at
//! tick time.
//!
//! The tick hook runs in interrupt context on the real target: it takes
//! only the controllers' internal locks, does no I/O, and its loops are
//! bounded by the compile-time table sizes.

use alloc::boxed::Box;
use alloc::sync::Arc;

use corral_exec::{Executive, TaskId};

use crate::cgroup::CGroupController;
use crate::ipcns::IpcNsController;
use crate::pidns::PidNsController;

/// The three controllers plus the executive they account against.
#[derive(Clone)]
pub struct IsolationHooks {
    pub exec: Arc<dyn Executive>,
    pub cgroups: Arc<CGroupController>,
    pub pidns: Arc<PidNsController>,
    pub ipcns: Arc<IpcNsController>,
}

impl IsolationHooks {
    pub fn new(exec: Arc<dyn Executive>) -> Self {
        Self {
            exec,
            cgroups: Arc::new(CGroupController::new()),
            pidns: Arc::new(PidNsController::new()),
            ipcns: Arc::new(IpcNsController::new()),
        }
    }

    /// Tick hook: window bookkeeping for every group, one tick charged
    /// to the currently running task's group.
    pub fn on_tick(&self) {
        let now = self.exec.now();
        let current = self.exec.current_task();
        self.cgroups.tick(now, current);
    }

    /// Switch-out hook: per-group context-switch bookkeeping.
    pub fn on_switch_out(&self, task: TaskId) {
        self.cgroups.note_switch(task);
    }

    /// Admission query: may the scheduler dispatch this task now?
    pub fn can_run(&self, task: TaskId) -> bool {
        self.cgroups.can_run(task)
    }

    /// Task-delete teardown across all three controllers.
    pub fn on_task_delete(&self, task: TaskId) {
        self.cgroups.on_task_delete(task);
        self.pidns.on_task_delete(task);
        self.ipcns.unbind_task(task);
    }

    /// Register the task-delete teardown with the executive. Tick,
    /// switch-out, and admission stay direct calls from the scheduler.
    pub fn install(&self) {
        let hooks = self.clone();
        self.exec
            .add_delete_hook(Box::new(move |task| hooks.on_task_delete(task)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use corral_exec::hosted::HostedExecutive;
    use corral_exec::TaskSpec;

    #[test]
    fn tick_charges_the_current_task() {
        let exec = Arc::new(HostedExecutive::new());
        let hooks = IsolationHooks::new(exec.clone());
        let g = hooks
            .cgroups
            .create("g", crate::cgroup::MEM_UNLIMITED, 100, 0)
            .unwrap();
        let t = exec
            .spawn(TaskSpec::new("w", Box::new(|_| {})).unwrap())
            .unwrap();
        hooks.cgroups.add_task(g, t).unwrap();

        // Outside any task context nothing is charged.
        exec.advance(1);
        hooks.on_tick();
        assert_eq!(hooks.cgroups.stats(g).unwrap().ticks_used, 0);

        // Charge a few ticks as if the scheduler were running `t`.
        for _ in 0..3 {
            exec.advance(1);
            hooks.cgroups.tick(exec.now(), t);
        }
        assert_eq!(hooks.cgroups.stats(g).unwrap().ticks_used, 3);
        hooks.on_switch_out(t);
        assert_eq!(hooks.cgroups.stats(g).unwrap().switches, 1);
    }

    #[test]
    fn installed_hook_tears_down_all_bindings() {
        let exec = Arc::new(HostedExecutive::new());
        let hooks = IsolationHooks::new(exec.clone());
        hooks.install();

        let g = hooks
            .cgroups
            .create("g", crate::cgroup::MEM_UNLIMITED, crate::cgroup::CPU_UNLIMITED, 0)
            .unwrap();
        let pns = hooks.pidns.create("p").unwrap();
        let ins = hooks.ipcns.create("i").unwrap();

        let t = exec
            .spawn(TaskSpec::new("w", Box::new(|_| {})).unwrap())
            .unwrap();
        hooks.cgroups.add_task(g, t).unwrap();
        hooks.pidns.add_task(pns, t).unwrap();
        hooks.ipcns.bind_task(t, ins).unwrap();

        exec.kill(t).unwrap();

        assert_eq!(hooks.cgroups.group_of(t), None);
        assert_eq!(hooks.pidns.namespace_of(t), hooks.pidns.root());
        assert_eq!(hooks.ipcns.ns_of(t), hooks.ipcns.root());
        // Now empty, so the resources can be torn down.
        hooks.cgroups.delete(g).unwrap();
        hooks.pidns.delete(pns).unwrap();
        hooks.ipcns.delete(ins).unwrap();
    }

    #[test]
    fn admission_follows_the_cgroup() {
        let exec = Arc::new(HostedExecutive::new());
        let hooks = IsolationHooks::new(exec.clone());
        let g = hooks
            .cgroups
            .create("g", crate::cgroup::MEM_UNLIMITED, 2, 0)
            .unwrap();
        let t = TaskId::new(1);
        hooks.cgroups.add_task(g, t).unwrap();

        assert!(hooks.can_run(t));
        hooks.cgroups.tick(1, t);
        hooks.cgroups.tick(2, t);
        assert!(!hooks.can_run(t));
    }
}
