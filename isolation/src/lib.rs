//! # corral-isolation
//!
//! The three independent isolation controllers a container composes:
//!
//! - **[`cgroup`]** — memory-usage accounting and admission, CPU-tick
//!   accounting per sliding window with penalty scheduling.
//! - **[`pidns`]** — per-namespace virtual PIDs: monotone allocation,
//!   translation, and namespace-scoped lookup.
//! - **[`ipcns`]** — a registry of executive IPC objects tagged by owner
//!   namespace, with a per-task access check and a root override.
//!
//! Each controller is a single object owning its fixed-size slot table
//! behind one lock; handles are index+generation pairs so a handle to a
//! deleted slot is detected as stale instead of aliasing a reused slot.
//! [`hooks::IsolationHooks`] bundles the scheduler entry points (tick,
//! switch-out, admission, task-delete) that drive all accounting.

#![no_std]

extern crate alloc;

pub mod cgroup;
pub mod config;
pub mod error;
pub mod handle;
pub mod hooks;
pub mod ipcns;
pub mod pidns;

pub use cgroup::{CGroupController, CGroupStats, CPU_UNLIMITED, MEM_UNLIMITED};
pub use error::{IsolationError, IsolationResult};
pub use handle::{CGroupId, IpcNsId, PidNsId};
pub use hooks::IsolationHooks;
pub use ipcns::{IpcNsController, IpcObjectKind};
pub use pidns::PidNsController;
