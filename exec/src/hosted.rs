//! # Hosted executive
//!
//! A deterministic, in-process implementation of [`Executive`] used by the
//! test suites and the simulation profile. Spawned tasks queue in FIFO
//! order and run to completion when the owner drives [`HostedExecutive::run_ready`];
//! the clock is a plain counter advanced explicitly. This keeps every
//! scheduling decision in the caller's hands, which is exactly what the
//! accounting and lifecycle tests need.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayString;
use hashbrown::HashMap;
use spin::{Mutex, RwLock};

use crate::error::{ExecError, ExecResult};
use crate::task::{DeleteHook, Executive, TaskEntry, TaskId, TaskSpec, Tick, MAX_NAME};

/// Maximum number of live tasks the hosted executive will carry.
pub const MAX_TASKS: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Ready,
    Running,
    Suspended,
    Done,
}

struct TaskRecord {
    #[allow(dead_code)]
    name: ArrayString<MAX_NAME>,
    #[allow(dead_code)]
    priority: u8,
    entry: Option<TaskEntry>,
    state: RecordState,
}

struct Inner {
    next_id: u64,
    current: u64,
    ready: VecDeque<u64>,
    tasks: HashMap<u64, TaskRecord>,
}

/// In-process reference executive.
pub struct HostedExecutive {
    clock: AtomicU64,
    inner: Mutex<Inner>,
    hooks: RwLock<Vec<DeleteHook>>,
}

impl HostedExecutive {
    pub fn new() -> Self {
        Self {
            clock: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                next_id: 1,
                current: 0,
                ready: VecDeque::new(),
                tasks: HashMap::new(),
            }),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Advance the clock by `ticks`.
    pub fn advance(&self, ticks: Tick) {
        self.clock.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Run queued entries until none is runnable. Returns how many ran.
    ///
    /// Each entry runs to completion with `current_task` set; completion
    /// fires the delete hooks unless the task was already killed mid-run.
    pub fn run_ready(&self) -> usize {
        let mut ran = 0;
        while let Some((id, entry)) = self.dispatch_next() {
            entry(TaskId::new(id));
            ran += 1;
            let completed = {
                let mut inner = self.inner.lock();
                inner.current = 0;
                match inner.tasks.get_mut(&id) {
                    Some(rec) if rec.state != RecordState::Done => {
                        rec.state = RecordState::Done;
                        true
                    }
                    _ => false,
                }
            };
            if completed {
                self.fire_hooks(TaskId::new(id));
            }
        }
        ran
    }

    /// Number of live (not completed, not killed) tasks.
    pub fn live_tasks(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .tasks
            .values()
            .filter(|t| t.state != RecordState::Done)
            .count()
    }

    fn dispatch_next(&self) -> Option<(u64, TaskEntry)> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(id) = inner.ready.pop_front() {
            match inner.tasks.get_mut(&id) {
                Some(rec) if rec.state == RecordState::Ready => {
                    if let Some(entry) = rec.entry.take() {
                        rec.state = RecordState::Running;
                        inner.current = id;
                        found = Some((id, entry));
                        break;
                    }
                }
                Some(rec) if rec.state == RecordState::Suspended => skipped.push(id),
                // Killed or unknown: fall out of the queue.
                _ => {}
            }
        }
        // Put suspended tasks back where they were, in order.
        for id in skipped.into_iter().rev() {
            inner.ready.push_front(id);
        }
        found
    }

    fn fire_hooks(&self, task: TaskId) {
        let hooks = self.hooks.read();
        for hook in hooks.iter() {
            hook(task);
        }
    }
}

impl Executive for HostedExecutive {
    fn now(&self) -> Tick {
        self.clock.load(Ordering::Relaxed)
    }

    fn current_task(&self) -> TaskId {
        TaskId::new(self.inner.lock().current)
    }

    fn spawn(&self, spec: TaskSpec) -> ExecResult<TaskId> {
        if spec.name.is_empty() {
            return Err(ExecError::InvalidName);
        }
        let mut inner = self.inner.lock();
        let live = inner
            .tasks
            .values()
            .filter(|t| t.state != RecordState::Done)
            .count();
        if live >= MAX_TASKS {
            return Err(ExecError::Capacity);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.tasks.insert(
            id,
            TaskRecord {
                name: spec.name,
                priority: spec.priority,
                entry: Some(spec.entry),
                state: RecordState::Ready,
            },
        );
        inner.ready.push_back(id);
        log::debug!("spawned task {} ({})", id, spec.name);
        Ok(TaskId::new(id))
    }

    fn kill(&self, task: TaskId) -> ExecResult<()> {
        {
            let mut inner = self.inner.lock();
            match inner.tasks.get_mut(&task.raw()) {
                Some(rec) if rec.state != RecordState::Done => {
                    rec.state = RecordState::Done;
                    rec.entry = None;
                }
                _ => return Err(ExecError::NoSuchTask),
            }
        }
        log::debug!("killed task {}", task);
        self.fire_hooks(task);
        Ok(())
    }

    fn suspend(&self, task: TaskId) -> ExecResult<()> {
        let mut inner = self.inner.lock();
        match inner.tasks.get_mut(&task.raw()) {
            Some(rec) if rec.state != RecordState::Done => {
                rec.state = RecordState::Suspended;
                Ok(())
            }
            _ => Err(ExecError::NoSuchTask),
        }
    }

    fn resume(&self, task: TaskId) -> ExecResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.tasks.get_mut(&task.raw()) {
            Some(rec) if rec.state == RecordState::Suspended => {
                rec.state = RecordState::Ready;
                if rec.entry.is_some() && !inner.ready.contains(&task.raw()) {
                    inner.ready.push_back(task.raw());
                }
                Ok(())
            }
            Some(rec) if rec.state != RecordState::Done => Ok(()),
            _ => Err(ExecError::NoSuchTask),
        }
    }

    fn is_alive(&self, task: TaskId) -> bool {
        let inner = self.inner.lock();
        inner
            .tasks
            .get(&task.raw())
            .is_some_and(|t| t.state != RecordState::Done)
    }

    fn yield_now(&self) {
        // Single-threaded host: nothing to hand the processor to.
        core::hint::spin_loop();
    }

    fn add_delete_hook(&self, hook: DeleteHook) {
        self.hooks.write().push(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use alloc::vec;
    use core::sync::atomic::AtomicUsize;

    fn spec(name: &str, entry: TaskEntry) -> TaskSpec {
        TaskSpec::new(name, entry).unwrap()
    }

    #[test]
    fn tasks_run_in_spawn_order() {
        let exec = HostedExecutive::new();
        let order = Arc::new(Mutex::new(vec![]));

        for i in 0..3u32 {
            let order = Arc::clone(&order);
            exec.spawn(spec("t", Box::new(move |_| order.lock().push(i))))
                .unwrap();
        }
        assert_eq!(exec.run_ready(), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn entry_sees_its_own_id() {
        let exec = HostedExecutive::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = Arc::clone(&seen);
        let id = exec
            .spawn(spec("me", Box::new(move |me| seen2.store(me.raw(), Ordering::Relaxed))))
            .unwrap();
        exec.run_ready();
        assert_eq!(seen.load(Ordering::Relaxed), id.raw());
    }

    #[test]
    fn delete_hooks_fire_once_per_task() {
        let exec = HostedExecutive::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        exec.add_delete_hook(Box::new(move |_| {
            fired2.fetch_add(1, Ordering::Relaxed);
        }));

        let completes = exec.spawn(spec("done", Box::new(|_| {}))).unwrap();
        let killed = exec.spawn(spec("killed", Box::new(|_| {}))).unwrap();
        exec.kill(killed).unwrap();
        exec.run_ready();

        assert_eq!(fired.load(Ordering::Relaxed), 2);
        assert!(!exec.is_alive(completes));
        assert!(!exec.is_alive(killed));
        // Killing a dead task is an error, and fires nothing.
        assert_eq!(exec.kill(killed), Err(ExecError::NoSuchTask));
        assert_eq!(fired.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn suspended_tasks_do_not_run() {
        let exec = HostedExecutive::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let t = exec
            .spawn(spec("s", Box::new(move |_| {
                ran2.fetch_add(1, Ordering::Relaxed);
            })))
            .unwrap();

        exec.suspend(t).unwrap();
        assert_eq!(exec.run_ready(), 0);
        assert_eq!(ran.load(Ordering::Relaxed), 0);
        assert!(exec.is_alive(t));

        exec.resume(t).unwrap();
        assert_eq!(exec.run_ready(), 1);
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn clock_advances_explicitly() {
        let exec = HostedExecutive::new();
        assert_eq!(exec.now(), 0);
        exec.advance(5);
        exec.advance(2);
        assert_eq!(exec.now(), 7);
    }

    #[test]
    fn ids_are_never_reused() {
        let exec = HostedExecutive::new();
        let a = exec.spawn(spec("a", Box::new(|_| {}))).unwrap();
        exec.kill(a).unwrap();
        let b = exec.spawn(spec("b", Box::new(|_| {}))).unwrap();
        assert!(b.raw() > a.raw());
    }
}
