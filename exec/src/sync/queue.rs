//! Bounded message queue with fixed item size.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use super::{alloc_sync_id, poll_until, SyncError, SyncId, SyncResult};
use crate::task::{Executive, Tick};

/// Fixed-capacity ring of byte messages.
struct Ring {
    slots: Vec<Option<Vec<u8>>>,
    read: usize,
    write: usize,
    count: usize,
}

impl Ring {
    fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(depth);
        for _ in 0..depth {
            slots.push(None);
        }
        Self {
            slots,
            read: 0,
            write: 0,
            count: 0,
        }
    }

    fn push(&mut self, msg: Vec<u8>) -> Result<(), Vec<u8>> {
        if self.count >= self.slots.len() {
            return Err(msg);
        }
        self.slots[self.write] = Some(msg);
        self.write = (self.write + 1) % self.slots.len();
        self.count += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Vec<u8>> {
        if self.count == 0 {
            return None;
        }
        let msg = self.slots[self.read].take();
        self.read = (self.read + 1) % self.slots.len();
        self.count -= 1;
        msg
    }
}

/// Bounded queue of fixed-size byte messages.
///
/// Mirrors the executive's native queue: every message is copied in on
/// send and out on receive, and must be exactly `item_size` bytes.
pub struct MsgQueue {
    id: SyncId,
    item_size: usize,
    depth: usize,
    ring: Mutex<Ring>,
    sent: AtomicUsize,
    received: AtomicUsize,
}

impl MsgQueue {
    pub fn new(depth: usize, item_size: usize) -> Self {
        Self {
            id: alloc_sync_id(),
            item_size,
            depth,
            ring: Mutex::new(Ring::new(depth)),
            sent: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> SyncId {
        self.id
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.depth
    }

    /// Copy one message in. Fails with [`SyncError::Full`] when no slot is
    /// free and [`SyncError::InvalidSize`] on an item-size mismatch.
    pub fn try_send(&self, msg: &[u8]) -> SyncResult<()> {
        if msg.len() != self.item_size {
            return Err(SyncError::InvalidSize);
        }
        let mut ring = self.ring.lock();
        match ring.push(msg.to_vec()) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Err(SyncError::Full),
        }
    }

    /// Copy one message out into `buf`, returning its length.
    pub fn try_recv(&self, buf: &mut [u8]) -> SyncResult<usize> {
        if buf.len() < self.item_size {
            return Err(SyncError::InvalidSize);
        }
        let mut ring = self.ring.lock();
        match ring.pop() {
            Some(msg) => {
                buf[..msg.len()].copy_from_slice(&msg);
                self.received.fetch_add(1, Ordering::Relaxed);
                Ok(msg.len())
            }
            None => Err(SyncError::Empty),
        }
    }

    /// Send, waiting up to `timeout` ticks for a free slot.
    pub fn send(&self, exec: &dyn Executive, msg: &[u8], timeout: Tick) -> SyncResult<()> {
        if msg.len() != self.item_size {
            return Err(SyncError::InvalidSize);
        }
        poll_until(exec, timeout, || self.try_send(msg).ok())
    }

    /// Receive, waiting up to `timeout` ticks for a message.
    pub fn recv(&self, exec: &dyn Executive, buf: &mut [u8], timeout: Tick) -> SyncResult<usize> {
        if buf.len() < self.item_size {
            return Err(SyncError::InvalidSize);
        }
        poll_until(exec, timeout, || self.try_recv(buf).ok())
    }

    /// Messages sent and received since creation.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.sent.load(Ordering::Relaxed),
            self.received.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_round_trip() {
        let q = MsgQueue::new(2, 4);
        q.try_send(b"abcd").unwrap();
        q.try_send(b"wxyz").unwrap();
        assert_eq!(q.try_send(b"full"), Err(SyncError::Full));

        let mut buf = [0u8; 4];
        assert_eq!(q.try_recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(q.try_recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"wxyz");
        assert_eq!(q.try_recv(&mut buf), Err(SyncError::Empty));
        assert_eq!(q.stats(), (2, 2));
    }

    #[test]
    fn item_size_is_enforced() {
        let q = MsgQueue::new(1, 8);
        assert_eq!(q.try_send(b"short"), Err(SyncError::InvalidSize));
        let mut small = [0u8; 4];
        assert_eq!(q.try_recv(&mut small), Err(SyncError::InvalidSize));
    }

    #[test]
    fn ring_wraps_around() {
        let q = MsgQueue::new(2, 1);
        let mut buf = [0u8; 1];
        for round in 0..5u8 {
            q.try_send(&[round]).unwrap();
            q.try_recv(&mut buf).unwrap();
            assert_eq!(buf[0], round);
        }
    }
}
