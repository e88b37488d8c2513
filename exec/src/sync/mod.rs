//! # Cooperative IPC primitives
//!
//! Message queues, counting semaphores, ownership mutexes, and event
//! groups, in the shape the host executive provides them: bounded, created
//! dynamically, addressed through opaque handles.
//!
//! Every primitive instance carries a process-unique [`SyncId`] so the IPC
//! namespace registry can tag it with an owner without holding a reference
//! to the object itself.
//!
//! Blocking variants poll the executive clock and yield between attempts;
//! a timeout of zero means try-once.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::task::{Executive, Tick};

pub mod event;
pub mod queue;
pub mod sem;

pub use event::{EventGroup, WaitFlags};
pub use queue::MsgQueue;
pub use sem::{MutexSem, Semaphore};

/// Result type alias for primitive operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by the IPC primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The wait deadline passed.
    Timeout,
    /// The queue has no free slot.
    Full,
    /// The queue has no message.
    Empty,
    /// The mutex is held by another task.
    Busy,
    /// The caller does not own the mutex.
    NotOwner,
    /// The event-group condition is not satisfied.
    NotReady,
    /// A message did not match the queue's item size.
    InvalidSize,
    /// A semaphore give would exceed its ceiling.
    Overflow,
}

impl SyncError {
    pub const fn message(self) -> &'static str {
        match self {
            Self::Timeout => "timed out",
            Self::Full => "queue full",
            Self::Empty => "queue empty",
            Self::Busy => "mutex busy",
            Self::NotOwner => "not mutex owner",
            Self::NotReady => "event bits not set",
            Self::InvalidSize => "bad message size",
            Self::Overflow => "semaphore ceiling reached",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Process-unique identity of an IPC primitive instance.
///
/// Ids are allocated monotonically and never reused, so a registry entry
/// can never alias a later object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SyncId(u64);

impl SyncId {
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync:{}", self.0)
    }
}

static NEXT_SYNC_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn alloc_sync_id() -> SyncId {
    SyncId(NEXT_SYNC_ID.fetch_add(1, Ordering::Relaxed))
}

/// Poll `op` until it yields a value or `timeout` ticks elapse.
///
/// Zero timeout is the non-blocking case: one attempt, then [`SyncError::Timeout`].
pub(crate) fn poll_until<T>(
    exec: &dyn Executive,
    timeout: Tick,
    mut op: impl FnMut() -> Option<T>,
) -> SyncResult<T> {
    if let Some(v) = op() {
        return Ok(v);
    }
    if timeout == 0 {
        return Err(SyncError::Timeout);
    }
    let deadline = exec.now().saturating_add(timeout);
    while exec.now() < deadline {
        exec.yield_now();
        if let Some(v) = op() {
            return Ok(v);
        }
    }
    Err(SyncError::Timeout)
}
