//! Counting semaphore and ownership-tracking mutex.

use spin::Mutex;

use super::{alloc_sync_id, poll_until, SyncError, SyncId, SyncResult};
use crate::task::{Executive, TaskId, Tick};

/// Counting semaphore with a fixed ceiling.
pub struct Semaphore {
    id: SyncId,
    state: Mutex<SemState>,
}

struct SemState {
    count: u32,
    max: u32,
}

impl Semaphore {
    /// `initial` must not exceed `max`; it is clamped if it does.
    pub fn new(initial: u32, max: u32) -> Self {
        Self {
            id: alloc_sync_id(),
            state: Mutex::new(SemState {
                count: initial.min(max),
                max,
            }),
        }
    }

    /// Binary semaphore, initially empty.
    pub fn binary() -> Self {
        Self::new(0, 1)
    }

    #[inline]
    pub fn id(&self) -> SyncId {
        self.id
    }

    pub fn count(&self) -> u32 {
        self.state.lock().count
    }

    /// Release one unit.
    pub fn give(&self) -> SyncResult<()> {
        let mut s = self.state.lock();
        if s.count >= s.max {
            return Err(SyncError::Overflow);
        }
        s.count += 1;
        Ok(())
    }

    /// Acquire one unit without waiting.
    pub fn try_take(&self) -> SyncResult<()> {
        let mut s = self.state.lock();
        if s.count == 0 {
            return Err(SyncError::NotReady);
        }
        s.count -= 1;
        Ok(())
    }

    /// Acquire one unit, waiting up to `timeout` ticks.
    pub fn take(&self, exec: &dyn Executive, timeout: Tick) -> SyncResult<()> {
        poll_until(exec, timeout, || self.try_take().ok())
    }
}

/// Mutex that records its owning task.
///
/// Unlike the raw spinlock this is an executive-level object: it can be
/// registered in an IPC namespace, and unlock is checked against the
/// owner recorded at lock time.
pub struct MutexSem {
    id: SyncId,
    owner: Mutex<TaskId>,
}

impl MutexSem {
    pub fn new() -> Self {
        Self {
            id: alloc_sync_id(),
            owner: Mutex::new(TaskId::NULL),
        }
    }

    #[inline]
    pub fn id(&self) -> SyncId {
        self.id
    }

    /// Current owner, [`TaskId::NULL`] when free.
    pub fn owner(&self) -> TaskId {
        *self.owner.lock()
    }

    /// Take ownership without waiting.
    pub fn try_lock(&self, task: TaskId) -> SyncResult<()> {
        let mut owner = self.owner.lock();
        if !owner.is_null() {
            return Err(SyncError::Busy);
        }
        *owner = task;
        Ok(())
    }

    /// Take ownership, waiting up to `timeout` ticks.
    pub fn lock(&self, exec: &dyn Executive, task: TaskId, timeout: Tick) -> SyncResult<()> {
        poll_until(exec, timeout, || self.try_lock(task).ok())
    }

    /// Release ownership. Only the owner may unlock.
    pub fn unlock(&self, task: TaskId) -> SyncResult<()> {
        let mut owner = self.owner.lock();
        if *owner != task {
            return Err(SyncError::NotOwner);
        }
        *owner = TaskId::NULL;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_counts_and_ceilings() {
        let sem = Semaphore::new(1, 2);
        sem.give().unwrap();
        assert_eq!(sem.give(), Err(SyncError::Overflow));
        sem.try_take().unwrap();
        sem.try_take().unwrap();
        assert_eq!(sem.try_take(), Err(SyncError::NotReady));
    }

    #[test]
    fn mutex_tracks_owner() {
        let m = MutexSem::new();
        let a = TaskId::new(1);
        let b = TaskId::new(2);

        m.try_lock(a).unwrap();
        assert_eq!(m.try_lock(b), Err(SyncError::Busy));
        assert_eq!(m.unlock(b), Err(SyncError::NotOwner));
        m.unlock(a).unwrap();
        assert_eq!(m.owner(), TaskId::NULL);
        m.try_lock(b).unwrap();
    }
}
