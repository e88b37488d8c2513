//! Single-shot startup gate.
//!
//! The container manager spawns a task, finishes wiring its isolation
//! (cgroup membership, namespace bindings), and only then releases the
//! gate the task is parked on. Release consumes the sender, so the gate
//! can fire at most once; the release store happens-before the waiter's
//! successful wake.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::sync::{poll_until, SyncResult};
use crate::task::{Executive, Tick};

struct Shared {
    released: AtomicBool,
}

/// Releasing half of a startup gate.
pub struct GateSender(Arc<Shared>);

/// Waiting half of a startup gate.
pub struct GateReceiver(Arc<Shared>);

/// Create a gate pair.
pub fn startup_gate() -> (GateSender, GateReceiver) {
    let shared = Arc::new(Shared {
        released: AtomicBool::new(false),
    });
    (GateSender(Arc::clone(&shared)), GateReceiver(shared))
}

impl GateSender {
    /// Open the gate. Consumes the sender.
    pub fn release(self) {
        self.0.released.store(true, Ordering::Release);
    }
}

impl GateReceiver {
    /// Whether the gate has been released.
    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::Acquire)
    }

    /// Park until the gate is released or `timeout` ticks elapse.
    pub fn wait(&self, exec: &dyn Executive, timeout: Tick) -> SyncResult<()> {
        poll_until(exec, timeout, || self.is_released().then_some(()))
    }
}
