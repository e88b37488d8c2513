//! Task identity and the executive trait.
//!
//! The host scheduler owns task creation, deletion, and the tick source.
//! This module pins down exactly what the container subsystem consumes
//! from it, and nothing more.

use alloc::boxed::Box;
use core::fmt;

use arrayvec::ArrayString;

use crate::error::ExecResult;

/// Maximum length of a task or container display name, in bytes.
pub const MAX_NAME: usize = 31;

/// Default priority for tasks spawned by the container subsystem.
pub const DEFAULT_PRIORITY: u8 = 1;

/// Monotonic tick count since boot.
pub type Tick = u64;

/// Opaque handle to a scheduler task.
///
/// Handle 0 is reserved as NULL ("no task"); live handles are never reused
/// within a process lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry point of a spawned task. Receives the task's own handle.
pub type TaskEntry = Box<dyn FnOnce(TaskId) + Send>;

/// Hook invoked when a task is deleted or completes.
///
/// This is the channel through which the isolation side tables and the
/// per-task filesystem state are torn down.
pub type DeleteHook = Box<dyn Fn(TaskId) + Send + Sync>;

/// Everything needed to create a task.
pub struct TaskSpec {
    /// Display name, at most [`MAX_NAME`] bytes.
    pub name: ArrayString<MAX_NAME>,
    /// Scheduler priority.
    pub priority: u8,
    /// Entry point.
    pub entry: TaskEntry,
}

impl TaskSpec {
    /// Build a spec with the default priority. Fails on an empty or
    /// over-long name.
    pub fn new(name: &str, entry: TaskEntry) -> Option<Self> {
        if name.is_empty() {
            return None;
        }
        let name = ArrayString::from(name).ok()?;
        Some(Self {
            name,
            priority: DEFAULT_PRIORITY,
            entry,
        })
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name.as_str())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// The narrow scheduler interface the container subsystem runs against.
///
/// Implementations must guarantee that a [`DeleteHook`] fires exactly once
/// per task, whether the task was killed or ran to completion, and that
/// `spawn` never reuses a previously issued [`TaskId`].
pub trait Executive: Send + Sync {
    /// Current tick count.
    fn now(&self) -> Tick;

    /// Handle of the task currently executing, or [`TaskId::NULL`] when
    /// called outside any task context.
    fn current_task(&self) -> TaskId;

    /// Create a task. The entry runs when the scheduler dispatches it.
    fn spawn(&self, spec: TaskSpec) -> ExecResult<TaskId>;

    /// Delete a task. Fires the delete hooks.
    fn kill(&self, task: TaskId) -> ExecResult<()>;

    /// Keep the task from being scheduled until [`Executive::resume`].
    fn suspend(&self, task: TaskId) -> ExecResult<()>;

    /// Make a suspended task runnable again.
    fn resume(&self, task: TaskId) -> ExecResult<()>;

    /// Whether the handle names a task that has neither completed nor
    /// been killed.
    fn is_alive(&self, task: TaskId) -> bool;

    /// Give up the processor to other runnable tasks.
    fn yield_now(&self);

    /// Register a hook to run when any task is deleted or completes.
    fn add_delete_hook(&self, hook: DeleteHook);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_task_id() {
        assert!(TaskId::NULL.is_null());
        assert!(!TaskId::new(3).is_null());
        assert_eq!(TaskId::new(7).raw(), 7);
    }

    #[test]
    fn task_spec_rejects_bad_names() {
        assert!(TaskSpec::new("", Box::new(|_| {})).is_none());
        assert!(TaskSpec::new(&"x".repeat(32), Box::new(|_| {})).is_none());
        let spec = TaskSpec::new("worker", Box::new(|_| {})).unwrap();
        assert_eq!(spec.name.as_str(), "worker");
        assert_eq!(spec.priority, DEFAULT_PRIORITY);
    }
}
