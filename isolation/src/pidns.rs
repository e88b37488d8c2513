//! # PID namespace controller
//!
//! Each namespace issues virtual PIDs starting at 1, monotonically, and
//! never recycles one within the namespace's lifetime. Lookups are
//! namespace-scoped: the same virtual PID in two namespaces resolves to
//! two different tasks. The root namespace exists from construction and
//! cannot be deleted; a task bound to no namespace reports the root.

use arrayvec::ArrayString;
use hashbrown::HashMap;
use spin::Mutex;

use corral_exec::{Executive, TaskId, TaskSpec, MAX_NAME};

use crate::config::{MAX_PID_NAMESPACES, MAX_VIRTUAL_PIDS};
use crate::error::{IsolationError, IsolationResult};
use crate::handle::PidNsId;

#[derive(Clone, Copy)]
struct PidEntry {
    task: TaskId,
    vpid: u32,
}

struct NsSlot {
    gen: u16,
    active: bool,
    name: ArrayString<MAX_NAME>,
    /// Unique numeric namespace id; 0 is the root.
    ns_num: u32,
    /// Next virtual PID to issue; monotone, never reset.
    next_vpid: u32,
    tasks: heapless::Vec<PidEntry, { MAX_VIRTUAL_PIDS as usize }>,
}

impl NsSlot {
    fn empty() -> Self {
        Self {
            gen: 0,
            active: false,
            name: ArrayString::new(),
            ns_num: 0,
            next_vpid: 1,
            tasks: heapless::Vec::new(),
        }
    }
}

struct State {
    slots: [NsSlot; MAX_PID_NAMESPACES],
    next_ns_num: u32,
    /// Task -> (namespace, virtual PID).
    bindings: HashMap<TaskId, (PidNsId, u32)>,
}

/// The PID namespace table.
pub struct PidNsController {
    state: Mutex<State>,
}

/// Handle of the root namespace: slot 0, generation 0, forever.
const ROOT: PidNsId = PidNsId { index: 0, gen: 0 };

impl PidNsController {
    /// Build the table with the root namespace already present.
    pub fn new() -> Self {
        let mut slots: [NsSlot; MAX_PID_NAMESPACES] = core::array::from_fn(|_| NsSlot::empty());
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
    pub const fn root(&self) -> PidNsId {
        ROOT
    }

    fn slot<'a>(state: &'a State, id: PidNsId) -> IsolationResult<&'a NsSlot> {
        let slot = state
            .slots
            .get(id.index as usize)
            .ok_or(IsolationError::NotFound)?;
        if !slot.active || slot.gen != id.gen {
            return Err(IsolationError::StaleHandle);
        }
        Ok(slot)
    }

    fn slot_mut<'a>(state: &'a mut State, id: PidNsId) -> IsolationResult<&'a mut NsSlot> {
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
    pub fn create(&self, name: &str) -> IsolationResult<PidNsId> {
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
        slot.next_vpid = 1;
        slot.tasks.clear();
        let id = PidNsId {
            index: index as u16,
            gen,
        };
        log::info!("pid namespace {:?} '{}' created (#{})", id, name, ns_num);
        Ok(id)
    }

    /// Delete a namespace. The root is permanent; a populated namespace
    /// is busy.
    pub fn delete(&self, id: PidNsId) -> IsolationResult<()> {
        if id == ROOT {
            return Err(IsolationError::RootNamespace);
        }
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, id)?;
        if !slot.tasks.is_empty() {
            return Err(IsolationError::Busy);
        }
        slot.active = false;
        slot.gen = slot.gen.wrapping_add(1);
        log::info!("pid namespace {:?} deleted", id);
        Ok(())
    }

    /// Bind a task, issuing the namespace's next virtual PID.
    pub fn add_task(&self, id: PidNsId, task: TaskId) -> IsolationResult<u32> {
        let mut state = self.state.lock();
        Self::slot(&state, id)?;
        if state.bindings.contains_key(&task) {
            return Err(IsolationError::AlreadyBound);
        }
        let vpid = {
            let slot = Self::slot_mut(&mut state, id)?;
            if slot.next_vpid > MAX_VIRTUAL_PIDS {
                return Err(IsolationError::Capacity);
            }
            let vpid = slot.next_vpid;
            slot.tasks
                .push(PidEntry { task, vpid })
                .map_err(|_| IsolationError::Capacity)?;
            slot.next_vpid += 1;
            vpid
        };
        state.bindings.insert(task, (id, vpid));
        Ok(vpid)
    }

    /// Unbind a task from *this* namespace. Clears both per-task fields;
    /// the virtual PID is not reissued.
    pub fn remove_task(&self, id: PidNsId, task: TaskId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        Self::slot(&state, id)?;
        match state.bindings.get(&task) {
            Some(&(bound, _)) if bound == id => {}
            _ => return Err(IsolationError::NotBound),
        }
        state.bindings.remove(&task);
        if let Ok(slot) = Self::slot_mut(&mut state, id) {
            slot.tasks.retain(|e| e.task != task);
        }
        Ok(())
    }

    /// Task-delete hook: drop the binding, wherever it points.
    pub fn on_task_delete(&self, task: TaskId) {
        let mut state = self.state.lock();
        if let Some((id, _)) = state.bindings.remove(&task) {
            if let Ok(slot) = Self::slot_mut(&mut state, id) {
                slot.tasks.retain(|e| e.task != task);
            }
        }
    }

    /// Two-step task creation inside a namespace: spawn through the
    /// executive, then bind. A failed bind deletes the fresh task.
    pub fn spawn_in(
        &self,
        exec: &dyn Executive,
        id: PidNsId,
        spec: TaskSpec,
    ) -> IsolationResult<(TaskId, u32)> {
        {
            let state = self.state.lock();
            Self::slot(&state, id)?;
        }
        let task = exec.spawn(spec)?;
        match self.add_task(id, task) {
            Ok(vpid) => Ok((task, vpid)),
            Err(e) => {
                if let Err(kill_err) = exec.kill(task) {
                    log::warn!("failed to reap task {} after bind failure: {}", task, kill_err);
                }
                Err(e)
            }
        }
    }

    /// Namespace-scoped lookup: resolves `vpid` inside `id` only.
    pub fn find_task(&self, id: PidNsId, vpid: u32) -> Option<TaskId> {
        let state = self.state.lock();
        let slot = Self::slot(&state, id).ok()?;
        slot.tasks.iter().find(|e| e.vpid == vpid).map(|e| e.task)
    }

    /// Namespace the task belongs to; unbound tasks report the root.
    pub fn namespace_of(&self, task: TaskId) -> PidNsId {
        self.state
            .lock()
            .bindings
            .get(&task)
            .map_or(ROOT, |&(id, _)| id)
    }

    /// The task's virtual PID; 0 when unbound.
    pub fn vpid_of(&self, task: TaskId) -> u32 {
        self.state
            .lock()
            .bindings
            .get(&task)
            .map_or(0, |&(_, vpid)| vpid)
    }

    /// Unique numeric id of a namespace.
    pub fn ns_num(&self, id: PidNsId) -> IsolationResult<u32> {
        let state = self.state.lock();
        Ok(Self::slot(&state, id)?.ns_num)
    }

    /// Number of tasks bound to a namespace.
    pub fn task_count(&self, id: PidNsId) -> IsolationResult<usize> {
        let state = self.state.lock();
        Ok(Self::slot(&state, id)?.tasks.len())
    }

    /// Number of active namespaces, root included.
    pub fn active_count(&self) -> usize {
        self.state.lock().slots.iter().filter(|s| s.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_exists_and_is_permanent() {
        let ctl = PidNsController::new();
        assert_eq!(ctl.active_count(), 1);
        assert_eq!(ctl.ns_num(ctl.root()).unwrap(), 0);
        assert_eq!(ctl.delete(ctl.root()), Err(IsolationError::RootNamespace));
    }

    #[test]
    fn vpids_start_at_one_and_are_monotone() {
        let ctl = PidNsController::new();
        let ns = ctl.create("a").unwrap();
        assert_eq!(ctl.add_task(ns, TaskId::new(10)).unwrap(), 1);
        assert_eq!(ctl.add_task(ns, TaskId::new(11)).unwrap(), 2);

        // Removal never recycles a vpid.
        ctl.remove_task(ns, TaskId::new(10)).unwrap();
        assert_eq!(ctl.add_task(ns, TaskId::new(12)).unwrap(), 3);
        assert_eq!(ctl.find_task(ns, 1), None);
    }

    #[test]
    fn same_vpid_in_two_namespaces_is_two_tasks() {
        let ctl = PidNsController::new();
        let a = ctl.create("a").unwrap();
        let b = ctl.create("b").unwrap();
        let (ta, tb) = (TaskId::new(10), TaskId::new(20));

        assert_eq!(ctl.add_task(a, ta).unwrap(), 1);
        assert_eq!(ctl.add_task(b, tb).unwrap(), 1);

        let found_a = ctl.find_task(a, 1).unwrap();
        let found_b = ctl.find_task(b, 1).unwrap();
        assert_eq!(found_a, ta);
        assert_eq!(found_b, tb);
        assert_ne!(found_a, found_b);
    }

    #[test]
    fn one_namespace_per_task() {
        let ctl = PidNsController::new();
        let a = ctl.create("a").unwrap();
        let b = ctl.create("b").unwrap();
        let t = TaskId::new(1);

        ctl.add_task(a, t).unwrap();
        assert_eq!(ctl.add_task(b, t), Err(IsolationError::AlreadyBound));
        assert_eq!(ctl.remove_task(b, t), Err(IsolationError::NotBound));
        assert_eq!(ctl.namespace_of(t), a);
        assert_eq!(ctl.vpid_of(t), 1);
    }

    #[test]
    fn unbound_tasks_report_the_root() {
        let ctl = PidNsController::new();
        let t = TaskId::new(99);
        assert_eq!(ctl.namespace_of(t), ctl.root());
        assert_eq!(ctl.vpid_of(t), 0);
    }

    #[test]
    fn delete_requires_empty_namespace() {
        let ctl = PidNsController::new();
        let ns = ctl.create("a").unwrap();
        ctl.add_task(ns, TaskId::new(1)).unwrap();
        assert_eq!(ctl.delete(ns), Err(IsolationError::Busy));
        ctl.remove_task(ns, TaskId::new(1)).unwrap();
        ctl.delete(ns).unwrap();
        assert_eq!(ctl.find_task(ns, 1), None);
    }

    #[test]
    fn vpid_space_is_exhaustible() {
        let ctl = PidNsController::new();
        let ns = ctl.create("small").unwrap();
        for i in 0..MAX_VIRTUAL_PIDS {
            ctl.add_task(ns, TaskId::new(100 + u64::from(i))).unwrap();
        }
        assert_eq!(
            ctl.add_task(ns, TaskId::new(9999)),
            Err(IsolationError::Capacity)
        );
    }

    #[test]
    fn task_delete_hook_clears_bindings() {
        let ctl = PidNsController::new();
        let ns = ctl.create("a").unwrap();
        let t = TaskId::new(5);
        ctl.add_task(ns, t).unwrap();
        ctl.on_task_delete(t);
        assert_eq!(ctl.namespace_of(t), ctl.root());
        assert_eq!(ctl.task_count(ns).unwrap(), 0);
    }
}
