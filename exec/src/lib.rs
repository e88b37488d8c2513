//! # corral-exec
//!
//! The narrow interface between the container subsystem and the host
//! real-time executive. The scheduler, tick source, and task primitives
//! themselves live outside this repository; everything corral needs from
//! them is expressed here:
//!
//! - **Task identity and the clock**: [`TaskId`], [`Tick`], and the
//!   [`Executive`] trait (spawn, kill, suspend/resume, current task,
//!   task-delete hooks).
//! - **Cooperative IPC primitives**: message queue, counting semaphore,
//!   ownership mutex, and event group, each with a process-unique
//!   [`sync::SyncId`] so higher layers can tag and gate them.
//! - **The startup gate**: the single-shot release primitive the container
//!   manager uses to hold a freshly spawned task until isolation is applied.
//! - **A hosted executive**: a deterministic in-process implementation of
//!   [`Executive`] used by the test suites and the simulation profile.

#![no_std]

extern crate alloc;

pub mod error;
pub mod gate;
pub mod hosted;
pub mod sync;
pub mod task;

pub use error::{ExecError, ExecResult};
pub use task::{DeleteHook, Executive, TaskId, TaskSpec, Tick, DEFAULT_PRIORITY, MAX_NAME};
