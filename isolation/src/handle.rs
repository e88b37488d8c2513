//! Generation-counted slot handles.
//!
//! Controllers store their state in fixed-size slot tables and reuse
//! slots after deletion. A handle therefore carries the slot index plus
//! the generation observed at creation; a lookup whose generation no
//! longer matches is a stale handle, not a silent alias of whatever now
//! occupies the slot.

use core::fmt;

/// Handle to a cgroup slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CGroupId {
    pub(crate) index: u16,
    pub(crate) gen: u16,
}

impl fmt::Debug for CGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cg{}.{}", self.index, self.gen)
    }
}

/// Handle to a PID namespace slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PidNsId {
    pub(crate) index: u16,
    pub(crate) gen: u16,
}

impl fmt::Debug for PidNsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pidns{}.{}", self.index, self.gen)
    }
}

/// Handle to an IPC namespace slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpcNsId {
    pub(crate) index: u16,
    pub(crate) gen: u16,
}

impl fmt::Debug for IpcNsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipcns{}.{}", self.index, self.gen)
    }
}
