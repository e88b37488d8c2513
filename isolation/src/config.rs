//! Compile-time capacity and accounting constants.
//!
//! These are part of the subsystem contract: every controller table is a
//! fixed-size array, loops over them are bounded, and overflow is a
//! caller-visible failure rather than an allocation.

use static_assertions::const_assert;

/// Maximum number of cgroups.
pub const MAX_CGROUPS: usize = 16;

/// Maximum tasks bound to one cgroup.
pub const MAX_TASKS_PER_CGROUP: usize = 16;

/// Maximum PID namespaces, the permanent root included.
pub const MAX_PID_NAMESPACES: usize = 32;

/// Highest virtual PID a namespace will ever issue.
pub const MAX_VIRTUAL_PIDS: u32 = 64;

/// Maximum IPC namespaces, the permanent root included.
pub const MAX_IPC_NAMESPACES: usize = 32;

/// Maximum registered IPC objects per namespace.
pub const MAX_IPC_OBJECTS: usize = 64;

/// CPU accounting window, in ticks. One wall second at the usual 1 kHz.
pub const WINDOW_TICKS: u64 = 1000;

/// Scale applied to the penalty accrued per over-quota window.
pub const PENALTY_NUMERATOR: u64 = 1;

const_assert!(WINDOW_TICKS > 0);
const_assert!(PENALTY_NUMERATOR > 0);
const_assert!(MAX_VIRTUAL_PIDS >= 1);
const_assert!(MAX_CGROUPS <= u16::MAX as usize);
const_assert!(MAX_PID_NAMESPACES <= u16::MAX as usize);
const_assert!(MAX_IPC_NAMESPACES <= u16::MAX as usize);
// The global task->cgroup map is bounded by both dimensions.
const_assert!(MAX_CGROUPS * MAX_TASKS_PER_CGROUP <= 4096);
