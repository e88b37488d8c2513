//! Event group: a set of flag bits tasks can set, clear, and wait on.

use spin::Mutex;

use super::{alloc_sync_id, poll_until, SyncError, SyncId, SyncResult};
use crate::task::{Executive, Tick};

bitflags::bitflags! {
    /// Options for [`EventGroup::try_wait`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WaitFlags: u8 {
        /// Require every bit in the mask, not just one.
        const ALL = 0b01;
        /// Clear the satisfied bits before returning.
        const CLEAR_ON_EXIT = 0b10;
    }
}

/// A 24-bit event flag group.
///
/// The top byte is reserved, matching the executive's native layout.
pub struct EventGroup {
    id: SyncId,
    bits: Mutex<u32>,
}

/// Mask of usable event bits.
pub const EVENT_BITS_MASK: u32 = 0x00ff_ffff;

impl EventGroup {
    pub fn new() -> Self {
        Self {
            id: alloc_sync_id(),
            bits: Mutex::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> SyncId {
        self.id
    }

    pub fn get(&self) -> u32 {
        *self.bits.lock()
    }

    /// Set bits in the group, returning the new value.
    pub fn set(&self, mask: u32) -> u32 {
        let mut bits = self.bits.lock();
        *bits |= mask & EVENT_BITS_MASK;
        *bits
    }

    /// Clear bits in the group, returning the previous value.
    pub fn clear(&self, mask: u32) -> u32 {
        let mut bits = self.bits.lock();
        let before = *bits;
        *bits &= !mask;
        before
    }

    /// Check the wait condition once. On success returns the bit value
    /// observed (before any clear-on-exit).
    pub fn try_wait(&self, mask: u32, flags: WaitFlags) -> SyncResult<u32> {
        let mask = mask & EVENT_BITS_MASK;
        let mut bits = self.bits.lock();
        let satisfied = if flags.contains(WaitFlags::ALL) {
            *bits & mask == mask
        } else {
            *bits & mask != 0
        };
        if !satisfied {
            return Err(SyncError::NotReady);
        }
        let observed = *bits;
        if flags.contains(WaitFlags::CLEAR_ON_EXIT) {
            *bits &= !mask;
        }
        Ok(observed)
    }

    /// Wait for the condition, up to `timeout` ticks.
    pub fn wait(
        &self,
        exec: &dyn Executive,
        mask: u32,
        flags: WaitFlags,
        timeout: Tick,
    ) -> SyncResult<u32> {
        poll_until(exec, timeout, || self.try_wait(mask, flags).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_wait_clear() {
        let eg = EventGroup::new();
        assert_eq!(eg.try_wait(0b11, WaitFlags::empty()), Err(SyncError::NotReady));

        eg.set(0b01);
        // ANY semantics: one bit is enough.
        assert_eq!(eg.try_wait(0b11, WaitFlags::empty()).unwrap(), 0b01);
        // ALL semantics: both bits required.
        assert_eq!(eg.try_wait(0b11, WaitFlags::ALL), Err(SyncError::NotReady));

        eg.set(0b10);
        let observed = eg
            .try_wait(0b11, WaitFlags::ALL | WaitFlags::CLEAR_ON_EXIT)
            .unwrap();
        assert_eq!(observed, 0b11);
        assert_eq!(eg.get(), 0);
    }

    #[test]
    fn reserved_bits_are_masked() {
        let eg = EventGroup::new();
        eg.set(0xff00_0001);
        assert_eq!(eg.get(), 1);
    }
}
