//! # IPC namespace controller
//!
//! A registry of executive IPC objects (queues, semaphores, mutexes,
//! event groups) tagged with the namespace of the task that created
//! them, plus the per-task access check the namespace-aware wrappers
//! consult.
//!
//! Objects created through the isolated constructors are registered
//! atomically: if no registry slot is free, the fresh object is dropped
//! and the caller sees the failure. Objects created through the plain
//! executive constructors are *not* registered, and the access check
//! lets every task at them — the compatibility path for pre-namespace
//! code.
//!
//! The root namespace is the administrative override: its tasks pass the
//! access check for objects in any namespace.

use alloc::sync::Arc;
use arrayvec::ArrayString;
use hashbrown::HashMap;
use spin::Mutex;

use corral_exec::sync::{EventGroup, MsgQueue, MutexSem, Semaphore, SyncId, WaitFlags};
use corral_exec::{TaskId, MAX_NAME};

use crate::config::{MAX_IPC_NAMESPACES, MAX_IPC_OBJECTS};
use crate::error::{IsolationError, IsolationResult};
use crate::handle::IpcNsId;

/// Kind tag of a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcObjectKind {
    Queue,
    Semaphore,
    Mutex,
    EventGroup,
}

#[derive(Clone, Copy)]
struct IpcEntry {
    sync_id: SyncId,
    kind: IpcObjectKind,
    name: ArrayString<MAX_NAME>,
    /// Per-namespace object id; monotone within the namespace.
    object_id: u32,
}

struct NsSlot {
    gen: u16,
    active: bool,
    name: ArrayString<MAX_NAME>,
    ns_num: u32,
    next_object_id: u32,
    objects: heapless::Vec<IpcEntry, MAX_IPC_OBJECTS>,
}

impl NsSlot {
    fn empty() -> Self {
        Self {
            gen: 0,
            active: false,
            name: ArrayString::new(),
            ns_num: 0,
            next_object_id: 1,
            objects: heapless::Vec::new(),
        }
    }
}

struct State {
    slots: [NsSlot; MAX_IPC_NAMESPACES],
    next_ns_num: u32,
    /// Task -> namespace binding. Unbound means root.
    bindings: HashMap<TaskId, IpcNsId>,
}

/// The IPC namespace table and object registry.
pub struct IpcNsController {
    state: Mutex<State>,
}

const ROOT: IpcNsId = IpcNsId { index: 0, gen: 0 };

impl IpcNsController {
    /// Build the table with the root namespace already present.
    pub fn new() -> Self {
        let mut slots: [NsSlot; MAX_IPC_NAMESPACES] = core::array::from_fn(|_| NsSlot::empty());
        slots[0].active = true;
        slots[0].name = ArrayString::from("root").unwrap_or_default();
        Self {
            state: Mutex::new(State {
                slots,
                next_ns_num: 1,
                bindings: HashMap::new(),
            }),
        }
    }

    /// The always-present root namespace.
    pub const fn root(&self) -> IpcNsId {
        ROOT
    }

    fn slot<'a>(state: &'a State, id: IpcNsId) -> IsolationResult<&'a NsSlot> {
        let slot = state
            .slots
            .get(id.index as usize)
            .ok_or(IsolationError::NotFound)?;
        if !slot.active || slot.gen != id.gen {
            return Err(IsolationError::StaleHandle);
        }
        Ok(slot)
    }

    fn slot_mut<'a>(state: &'a mut State, id: IpcNsId) -> IsolationResult<&'a mut NsSlot> {
        let slot = state
            .slots
            .get_mut(id.index as usize)
            .ok_or(IsolationError::NotFound)?;
        if !slot.active || slot.gen != id.gen {
            return Err(IsolationError::StaleHandle);
        }
        Ok(slot)
    }

    /// Create a namespace.
    pub fn create(&self, name: &str) -> IsolationResult<IpcNsId> {
        if name.is_empty() {
            return Err(IsolationError::InvalidName);
        }
        let name = ArrayString::from(name).map_err(|_| IsolationError::InvalidName)?;
        let mut state = self.state.lock();
        let index = state
            .slots
            .iter()
            .position(|s| !s.active)
            .ok_or(IsolationError::Capacity)?;
        let ns_num = state.next_ns_num;
        state.next_ns_num += 1;
        let slot = &mut state.slots[index];
        let gen = slot.gen;
        slot.active = true;
        slot.name = name;
        slot.ns_num = ns_num;
        slot.next_object_id = 1;
        slot.objects.clear();
        let id = IpcNsId {
            index: index as u16,
            gen,
        };
        log::info!("ipc namespace {:?} '{}' created (#{})", id, name, ns_num);
        Ok(id)
    }

    /// Delete a namespace. It must hold no registered objects; the
    /// owner is expected to unregister during teardown.
    pub fn delete(&self, id: IpcNsId) -> IsolationResult<()> {
        if id == ROOT {
            return Err(IsolationError::RootNamespace);
        }
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, id)?;
        if !slot.objects.is_empty() {
            return Err(IsolationError::Busy);
        }
        slot.active = false;
        slot.gen = slot.gen.wrapping_add(1);
        log::info!("ipc namespace {:?} deleted", id);
        Ok(())
    }

    /// Bind a task to a namespace. Must be called from the task's own
    /// context (the container wrapper applies its namespace to itself).
    pub fn bind_task(&self, task: TaskId, id: IpcNsId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        Self::slot(&state, id)?;
        match state.bindings.get(&task) {
            Some(&bound) if bound != id => return Err(IsolationError::AlreadyBound),
            _ => {}
        }
        state.bindings.insert(task, id);
        Ok(())
    }

    /// Drop a task's binding; it reverts to the root namespace. Called
    /// from the task-delete hook, so an absent binding is not an error.
    pub fn unbind_task(&self, task: TaskId) {
        self.state.lock().bindings.remove(&task);
    }

    /// Namespace the task belongs to; unbound tasks report the root.
    pub fn ns_of(&self, task: TaskId) -> IpcNsId {
        self.state.lock().bindings.get(&task).copied().unwrap_or(ROOT)
    }

    /// Register an object into the creator's namespace.
    fn register_for(
        &self,
        task: TaskId,
        sync_id: SyncId,
        kind: IpcObjectKind,
        name: &str,
    ) -> IsolationResult<u32> {
        let ns = self.ns_of(task);
        self.register(ns, sync_id, kind, name)
    }

    /// Register an object into an explicit namespace.
    pub fn register(
        &self,
        ns: IpcNsId,
        sync_id: SyncId,
        kind: IpcObjectKind,
        name: &str,
    ) -> IsolationResult<u32> {
        let name = ArrayString::from(name).map_err(|_| IsolationError::InvalidName)?;
        let mut state = self.state.lock();
        Self::slot(&state, ns)?;
        let duplicate = state
            .slots
            .iter()
            .filter(|s| s.active)
            .any(|s| s.objects.iter().any(|e| e.sync_id == sync_id));
        if duplicate {
            return Err(IsolationError::AlreadyExists);
        }
        let slot = Self::slot_mut(&mut state, ns)?;
        let object_id = slot.next_object_id;
        slot.objects
            .push(IpcEntry {
                sync_id,
                kind,
                name,
                object_id,
            })
            .map_err(|_| IsolationError::Capacity)?;
        slot.next_object_id += 1;
        log::debug!("{} registered as {:?} object {} in {:?}", sync_id, kind, object_id, ns);
        Ok(object_id)
    }

    /// Remove an object's registry entry, wherever it lives.
    pub fn unregister(&self, sync_id: SyncId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        for slot in state.slots.iter_mut().filter(|s| s.active) {
            if let Some(pos) = slot.objects.iter().position(|e| e.sync_id == sync_id) {
                slot.objects.swap_remove(pos);
                return Ok(());
            }
        }
        Err(IsolationError::NotFound)
    }

    /// Drop every entry of a namespace, returning how many were removed.
    /// Teardown helper for owners about to delete the namespace.
    pub fn unregister_all(&self, ns: IpcNsId) -> IsolationResult<usize> {
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, ns)?;
        let count = slot.objects.len();
        slot.objects.clear();
        Ok(count)
    }

    /// The access check. Unregistered objects are open to everyone;
    /// registered objects admit their owner namespace and the root.
    pub fn check_access(&self, task: TaskId, sync_id: SyncId) -> bool {
        let state = self.state.lock();
        let mut owner = None;
        for (index, slot) in state.slots.iter().enumerate().filter(|(_, s)| s.active) {
            if slot.objects.iter().any(|e| e.sync_id == sync_id) {
                owner = Some(IpcNsId {
                    index: index as u16,
                    gen: slot.gen,
                });
                break;
            }
        }
        let Some(owner) = owner else {
            // Legacy path: objects created outside the registry.
            return true;
        };
        let caller = state.bindings.get(&task).copied().unwrap_or(ROOT);
        caller == owner || caller == ROOT
    }

    /// Number of objects registered in a namespace.
    pub fn object_count(&self, ns: IpcNsId) -> IsolationResult<usize> {
        let state = self.state.lock();
        Ok(Self::slot(&state, ns)?.objects.len())
    }

    /// Number of active namespaces, root included.
    pub fn active_count(&self) -> usize {
        self.state.lock().slots.iter().filter(|s| s.active).count()
    }

    // ---- isolated constructors ---------------------------------------------
    //
    // Create through the executive's normal constructor, then register.
    // Registration failure drops the fresh object so nothing leaks.

    pub fn create_queue(
        &self,
        task: TaskId,
        name: &str,
        depth: usize,
        item_size: usize,
    ) -> IsolationResult<Arc<MsgQueue>> {
        let queue = Arc::new(MsgQueue::new(depth, item_size));
        match self.register_for(task, queue.id(), IpcObjectKind::Queue, name) {
            Ok(_) => Ok(queue),
            Err(e) => {
                drop(queue);
                Err(e)
            }
        }
    }

    pub fn create_semaphore(
        &self,
        task: TaskId,
        name: &str,
        initial: u32,
        max: u32,
    ) -> IsolationResult<Arc<Semaphore>> {
        let sem = Arc::new(Semaphore::new(initial, max));
        match self.register_for(task, sem.id(), IpcObjectKind::Semaphore, name) {
            Ok(_) => Ok(sem),
            Err(e) => {
                drop(sem);
                Err(e)
            }
        }
    }

    pub fn create_mutex(&self, task: TaskId, name: &str) -> IsolationResult<Arc<MutexSem>> {
        let mutex = Arc::new(MutexSem::new());
        match self.register_for(task, mutex.id(), IpcObjectKind::Mutex, name) {
            Ok(_) => Ok(mutex),
            Err(e) => {
                drop(mutex);
                Err(e)
            }
        }
    }

    pub fn create_event_group(
        &self,
        task: TaskId,
        name: &str,
    ) -> IsolationResult<Arc<EventGroup>> {
        let group = Arc::new(EventGroup::new());
        match self.register_for(task, group.id(), IpcObjectKind::EventGroup, name) {
            Ok(_) => Ok(group),
            Err(e) => {
                drop(group);
                Err(e)
            }
        }
    }

    // ---- guarded operations ------------------------------------------------
    //
    // The namespace-aware faces of the primitives: check access, then
    // forward to the executive object.

    pub fn queue_send(&self, task: TaskId, queue: &MsgQueue, msg: &[u8]) -> IsolationResult<()> {
        if !self.check_access(task, queue.id()) {
            return Err(IsolationError::AccessDenied);
        }
        queue.try_send(msg).map_err(IsolationError::Sync)
    }

    pub fn queue_recv(
        &self,
        task: TaskId,
        queue: &MsgQueue,
        buf: &mut [u8],
    ) -> IsolationResult<usize> {
        if !self.check_access(task, queue.id()) {
            return Err(IsolationError::AccessDenied);
        }
        queue.try_recv(buf).map_err(IsolationError::Sync)
    }

    pub fn sem_give(&self, task: TaskId, sem: &Semaphore) -> IsolationResult<()> {
        if !self.check_access(task, sem.id()) {
            return Err(IsolationError::AccessDenied);
        }
        sem.give().map_err(IsolationError::Sync)
    }

    pub fn sem_take(&self, task: TaskId, sem: &Semaphore) -> IsolationResult<()> {
        if !self.check_access(task, sem.id()) {
            return Err(IsolationError::AccessDenied);
        }
        sem.try_take().map_err(IsolationError::Sync)
    }

    pub fn mutex_lock(&self, task: TaskId, mutex: &MutexSem) -> IsolationResult<()> {
        if !self.check_access(task, mutex.id()) {
            return Err(IsolationError::AccessDenied);
        }
        mutex.try_lock(task).map_err(IsolationError::Sync)
    }

    pub fn mutex_unlock(&self, task: TaskId, mutex: &MutexSem) -> IsolationResult<()> {
        if !self.check_access(task, mutex.id()) {
            return Err(IsolationError::AccessDenied);
        }
        mutex.unlock(task).map_err(IsolationError::Sync)
    }

    pub fn event_set(&self, task: TaskId, group: &EventGroup, mask: u32) -> IsolationResult<u32> {
        if !self.check_access(task, group.id()) {
            return Err(IsolationError::AccessDenied);
        }
        Ok(group.set(mask))
    }

    pub fn event_wait(
        &self,
        task: TaskId,
        group: &EventGroup,
        mask: u32,
        flags: WaitFlags,
    ) -> IsolationResult<u32> {
        if !self.check_access(task, group.id()) {
            return Err(IsolationError::AccessDenied);
        }
        group.try_wait(mask, flags).map_err(IsolationError::Sync)
    }
}
