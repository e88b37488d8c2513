//! # CGroup controller
//!
//! Quota-and-accounting groups applying memory and CPU-time limits to
//! their member tasks.
//!
//! Memory is gated at allocation time: [`CGroupController::check_memory`]
//! answers admission, [`CGroupController::update_memory`] tracks usage
//! with a floor of zero and a monotone peak. CPU time is accounted per
//! sliding window: every scheduler tick charges the running task's group,
//! and when a group's window rolls over, consumption beyond the quota is
//! converted into penalty ticks during which the whole group is
//! ineligible to run ([`CGroupController::can_run`]).
//!
//! `cpu_quota` is **ticks per window** everywhere in this module; callers
//! speaking percentages convert at their own edge.

use arrayvec::ArrayString;
use hashbrown::HashMap;
use spin::Mutex;

use corral_exec::{TaskId, Tick, MAX_NAME};

use crate::config::{MAX_CGROUPS, MAX_TASKS_PER_CGROUP, PENALTY_NUMERATOR, WINDOW_TICKS};
use crate::error::{IsolationError, IsolationResult};
use crate::handle::CGroupId;

/// Memory-limit sentinel: no memory gating.
pub const MEM_UNLIMITED: usize = usize::MAX;

/// CPU-quota sentinel: no CPU gating, no penalty ever accrues.
pub const CPU_UNLIMITED: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct Slot {
    gen: u16,
    active: bool,
    name: ArrayString<MAX_NAME>,
    mem_limit: usize,
    mem_used: usize,
    mem_peak: usize,
    /// Ticks permitted per window.
    cpu_quota: u32,
    ticks_used: u32,
    penalty_left: u64,
    window_start: Tick,
    task_count: u16,
    switches: u32,
}

const EMPTY_SLOT: Slot = Slot {
    gen: 0,
    active: false,
    name: ArrayString::new_const(),
    mem_limit: MEM_UNLIMITED,
    mem_used: 0,
    mem_peak: 0,
    cpu_quota: CPU_UNLIMITED,
    ticks_used: 0,
    penalty_left: 0,
    window_start: 0,
    task_count: 0,
    switches: 0,
};

/// Accounting snapshot of one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CGroupStats {
    pub name: ArrayString<MAX_NAME>,
    pub mem_used: usize,
    pub mem_peak: usize,
    pub mem_limit: usize,
    pub cpu_quota: u32,
    pub ticks_used: u32,
    pub penalty_left: u64,
    pub task_count: usize,
    pub switches: u32,
}

struct State {
    slots: [Slot; MAX_CGROUPS],
    /// Global task -> group map; at most one group per task.
    bindings: HashMap<TaskId, CGroupId>,
}

/// The cgroup table. All state sits behind one short-held lock, the
/// stand-in for the executive's interrupt-critical section: no I/O
/// inside, loops bounded by [`MAX_CGROUPS`].
pub struct CGroupController {
    state: Mutex<State>,
}

impl CGroupController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                slots: [EMPTY_SLOT; MAX_CGROUPS],
                bindings: HashMap::new(),
            }),
        }
    }

    fn slot<'a>(state: &'a State, id: CGroupId) -> IsolationResult<&'a Slot> {
        let slot = state
            .slots
            .get(id.index as usize)
            .ok_or(IsolationError::NotFound)?;
        if !slot.active || slot.gen != id.gen {
            return Err(IsolationError::StaleHandle);
        }
        Ok(slot)
    }

    fn slot_mut<'a>(state: &'a mut State, id: CGroupId) -> IsolationResult<&'a mut Slot> {
        let slot = state
            .slots
            .get_mut(id.index as usize)
            .ok_or(IsolationError::NotFound)?;
        if !slot.active || slot.gen != id.gen {
            return Err(IsolationError::StaleHandle);
        }
        Ok(slot)
    }

    /// Create a group. `mem_limit` of [`MEM_UNLIMITED`] disables memory
    /// gating; `cpu_quota` of [`CPU_UNLIMITED`] disables CPU gating.
    /// `now` seeds the first accounting window.
    pub fn create(
        &self,
        name: &str,
        mem_limit: usize,
        cpu_quota: u32,
        now: Tick,
    ) -> IsolationResult<CGroupId> {
        let name = parse_name(name)?;
        if cpu_quota == 0 {
            return Err(IsolationError::InvalidArgument);
        }
        let mut state = self.state.lock();
        let index = state
            .slots
            .iter()
            .position(|s| !s.active)
            .ok_or(IsolationError::Capacity)?;
        let slot = &mut state.slots[index];
        let gen = slot.gen;
        *slot = Slot {
            gen,
            active: true,
            name,
            mem_limit,
            cpu_quota,
            window_start: now,
            ..EMPTY_SLOT
        };
        let id = CGroupId {
            index: index as u16,
            gen,
        };
        log::info!("cgroup {:?} '{}' created (mem={}, quota={})", id, name, mem_limit, cpu_quota);
        Ok(id)
    }

    /// Delete a group. Fails while any task is still bound to it.
    pub fn delete(&self, id: CGroupId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, id)?;
        if slot.task_count > 0 {
            return Err(IsolationError::Busy);
        }
        slot.active = false;
        slot.gen = slot.gen.wrapping_add(1);
        log::info!("cgroup {:?} deleted", id);
        Ok(())
    }

    /// Bind a task. A task belongs to at most one group.
    pub fn add_task(&self, id: CGroupId, task: TaskId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        Self::slot(&state, id)?;
        if state.bindings.contains_key(&task) {
            return Err(IsolationError::AlreadyBound);
        }
        if state.bindings.len() >= MAX_CGROUPS * MAX_TASKS_PER_CGROUP {
            return Err(IsolationError::Capacity);
        }
        {
            let slot = Self::slot_mut(&mut state, id)?;
            if slot.task_count as usize >= MAX_TASKS_PER_CGROUP {
                return Err(IsolationError::Capacity);
            }
            slot.task_count += 1;
        }
        state.bindings.insert(task, id);
        Ok(())
    }

    /// Unbind a task. Fails if the task is not bound to *this* group
    /// (it may well be bound to another).
    pub fn remove_task(&self, id: CGroupId, task: TaskId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        Self::slot(&state, id)?;
        if state.bindings.get(&task) != Some(&id) {
            return Err(IsolationError::NotBound);
        }
        state.bindings.remove(&task);
        if let Ok(slot) = Self::slot_mut(&mut state, id) {
            slot.task_count = slot.task_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Task-delete hook: drop the binding, wherever it points.
    pub fn on_task_delete(&self, task: TaskId) {
        let mut state = self.state.lock();
        if let Some(id) = state.bindings.remove(&task) {
            if let Ok(slot) = Self::slot_mut(&mut state, id) {
                slot.task_count = slot.task_count.saturating_sub(1);
            }
        }
    }

    /// Group the task is bound to, if any.
    pub fn group_of(&self, task: TaskId) -> Option<CGroupId> {
        self.state.lock().bindings.get(&task).copied()
    }

    /// Would an allocation of `size` bytes stay within the task's group
    /// limit? Unbound tasks and unlimited groups always pass.
    pub fn check_memory(&self, task: TaskId, size: usize) -> bool {
        let state = self.state.lock();
        let Some(&id) = state.bindings.get(&task) else {
            return true;
        };
        match Self::slot(&state, id) {
            Ok(slot) => {
                slot.mem_limit == MEM_UNLIMITED
                    || slot.mem_used.saturating_add(size) <= slot.mem_limit
            }
            Err(_) => true,
        }
    }

    /// Apply a signed usage delta to the task's group. A release larger
    /// than the current usage clamps at zero; an unbound task is a no-op
    /// success.
    pub fn update_memory(&self, task: TaskId, delta: isize) -> IsolationResult<()> {
        let mut state = self.state.lock();
        let Some(&id) = state.bindings.get(&task) else {
            return Ok(());
        };
        let slot = Self::slot_mut(&mut state, id)?;
        let magnitude = delta.unsigned_abs();
        if delta >= 0 {
            slot.mem_used = slot.mem_used.saturating_add(magnitude);
            slot.mem_peak = slot.mem_peak.max(slot.mem_used);
        } else {
            slot.mem_used = slot.mem_used.saturating_sub(magnitude);
        }
        Ok(())
    }

    /// Admission check at context switch: true if the task is unbound,
    /// or its group has no pending penalty and window headroom left.
    pub fn can_run(&self, task: TaskId) -> bool {
        let state = self.state.lock();
        let Some(&id) = state.bindings.get(&task) else {
            return true;
        };
        match Self::slot(&state, id) {
            Ok(slot) => {
                slot.penalty_left == 0
                    && (slot.cpu_quota == CPU_UNLIMITED || slot.ticks_used < slot.cpu_quota)
            }
            Err(_) => true,
        }
    }

    /// Per-tick accounting. Rolls windows and decays penalties for every
    /// active group, then charges one tick to `current`'s group.
    ///
    /// On a rollover, consumption beyond the quota accrues
    /// `excess * window / quota` penalty ticks; on every other tick a
    /// pending penalty decays by exactly one.
    pub fn tick(&self, now: Tick, current: TaskId) {
        let mut state = self.state.lock();
        for slot in state.slots.iter_mut().filter(|s| s.active) {
            let rolled = now.wrapping_sub(slot.window_start) >= WINDOW_TICKS;
            if rolled {
                if slot.cpu_quota != CPU_UNLIMITED {
                    let excess = u64::from(slot.ticks_used.saturating_sub(slot.cpu_quota));
                    if excess > 0 {
                        slot.penalty_left +=
                            excess * WINDOW_TICKS * PENALTY_NUMERATOR / u64::from(slot.cpu_quota);
                    }
                }
                slot.ticks_used = 0;
                slot.window_start = now;
            } else if slot.penalty_left > 0 {
                slot.penalty_left -= 1;
            }
        }
        if let Some(&id) = state.bindings.get(&current) {
            if let Ok(slot) = Self::slot_mut(&mut state, id) {
                slot.ticks_used = slot.ticks_used.saturating_add(1);
            }
        }
    }

    /// Switch-out bookkeeping: count the context switch against the
    /// task's group.
    pub fn note_switch(&self, task: TaskId) {
        let mut state = self.state.lock();
        if let Some(&id) = state.bindings.get(&task) {
            if let Ok(slot) = Self::slot_mut(&mut state, id) {
                slot.switches = slot.switches.wrapping_add(1);
            }
        }
    }

    /// Accounting snapshot.
    pub fn stats(&self, id: CGroupId) -> IsolationResult<CGroupStats> {
        let state = self.state.lock();
        let slot = Self::slot(&state, id)?;
        Ok(CGroupStats {
            name: slot.name,
            mem_used: slot.mem_used,
            mem_peak: slot.mem_peak,
            mem_limit: slot.mem_limit,
            cpu_quota: slot.cpu_quota,
            ticks_used: slot.ticks_used,
            penalty_left: slot.penalty_left,
            task_count: slot.task_count as usize,
            switches: slot.switches,
        })
    }

    pub fn set_memory_limit(&self, id: CGroupId, limit: usize) -> IsolationResult<()> {
        let mut state = self.state.lock();
        Self::slot_mut(&mut state, id)?.mem_limit = limit;
        Ok(())
    }

    pub fn set_cpu_quota(&self, id: CGroupId, quota: u32) -> IsolationResult<()> {
        if quota == 0 {
            return Err(IsolationError::InvalidArgument);
        }
        let mut state = self.state.lock();
        Self::slot_mut(&mut state, id)?.cpu_quota = quota;
        Ok(())
    }

    /// Reset the peak watermark down to the current usage.
    pub fn reset_memory_stats(&self, id: CGroupId) -> IsolationResult<()> {
        let mut state = self.state.lock();
        let slot = Self::slot_mut(&mut state, id)?;
        slot.mem_peak = slot.mem_used;
        Ok(())
    }

    /// Sum of memory accounted across all active groups.
    pub fn total_memory(&self) -> usize {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .filter(|s| s.active)
            .fold(0usize, |acc, s| acc.saturating_add(s.mem_used))
    }

    /// Exact-match lookup by name.
    pub fn get_by_name(&self, name: &str) -> Option<CGroupId> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.active && s.name.as_str() == name)
            .map(|(index, s)| CGroupId {
                index: index as u16,
                gen: s.gen,
            })
    }

    /// Number of active groups.
    pub fn active_count(&self) -> usize {
        self.state.lock().slots.iter().filter(|s| s.active).count()
    }
}

fn parse_name(name: &str) -> IsolationResult<ArrayString<MAX_NAME>> {
    if name.is_empty() {
        return Err(IsolationError::InvalidName);
    }
    ArrayString::from(name).map_err(|_| IsolationError::InvalidName)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota_group(ctl: &CGroupController, quota: u32) -> CGroupId {
        ctl.create("hi", 16 * 1024, quota, 0).unwrap()
    }

    #[test]
    fn create_validates_inputs() {
        let ctl = CGroupController::new();
        assert_eq!(
            ctl.create("", MEM_UNLIMITED, CPU_UNLIMITED, 0),
            Err(IsolationError::InvalidName)
        );
        assert_eq!(
            ctl.create("g", MEM_UNLIMITED, 0, 0),
            Err(IsolationError::InvalidArgument)
        );
    }

    #[test]
    fn slots_fill_and_are_reused_with_fresh_generations() {
        let ctl = CGroupController::new();
        let mut ids = alloc::vec::Vec::new();
        for i in 0..MAX_CGROUPS {
            ids.push(ctl.create("g", MEM_UNLIMITED, 100 + i as u32, 0).unwrap());
        }
        assert_eq!(
            ctl.create("overflow", MEM_UNLIMITED, 1, 0),
            Err(IsolationError::Capacity)
        );

        ctl.delete(ids[0]).unwrap();
        // The old handle is detected, not silently re-pointed.
        assert_eq!(ctl.stats(ids[0]), Err(IsolationError::StaleHandle));

        let fresh = ctl.create("g", MEM_UNLIMITED, 7, 0).unwrap();
        assert_eq!(fresh.index, ids[0].index);
        assert_ne!(fresh.gen, ids[0].gen);
        assert_eq!(ctl.stats(fresh).unwrap().cpu_quota, 7);
    }

    #[test]
    fn recreate_after_delete_is_equivalent() {
        let ctl = CGroupController::new();
        let a = ctl.create("workers", 4096, 250, 0).unwrap();
        ctl.delete(a).unwrap();
        let b = ctl.create("workers", 4096, 250, 0).unwrap();
        let stats = ctl.stats(b).unwrap();
        assert_eq!(stats.name.as_str(), "workers");
        assert_eq!(stats.mem_limit, 4096);
        assert_eq!(stats.cpu_quota, 250);
        assert_eq!(stats.mem_used, 0);
    }

    #[test]
    fn task_binding_rules() {
        let ctl = CGroupController::new();
        let a = quota_group(&ctl, 100);
        let b = ctl.create("other", MEM_UNLIMITED, 100, 0).unwrap();
        let t = TaskId::new(1);

        ctl.add_task(a, t).unwrap();
        assert_eq!(ctl.add_task(b, t), Err(IsolationError::AlreadyBound));
        // Not bound to b, even though it is bound somewhere.
        assert_eq!(ctl.remove_task(b, t), Err(IsolationError::NotBound));
        assert_eq!(ctl.group_of(t), Some(a));

        // A populated group cannot be deleted.
        assert_eq!(ctl.delete(a), Err(IsolationError::Busy));
        ctl.remove_task(a, t).unwrap();
        ctl.delete(a).unwrap();
    }

    #[test]
    fn per_group_task_capacity() {
        let ctl = CGroupController::new();
        let g = quota_group(&ctl, 100);
        for i in 0..MAX_TASKS_PER_CGROUP {
            ctl.add_task(g, TaskId::new(1 + i as u64)).unwrap();
        }
        assert_eq!(
            ctl.add_task(g, TaskId::new(999)),
            Err(IsolationError::Capacity)
        );
    }

    #[test]
    fn memory_accounting_clamps_and_peaks() {
        let ctl = CGroupController::new();
        let g = ctl.create("mem", 1000, CPU_UNLIMITED, 0).unwrap();
        let t = TaskId::new(1);
        ctl.add_task(g, t).unwrap();

        assert!(ctl.check_memory(t, 1000));
        assert!(!ctl.check_memory(t, 1001));

        ctl.update_memory(t, 600).unwrap();
        assert!(ctl.check_memory(t, 400));
        assert!(!ctl.check_memory(t, 401));

        // Release more than was ever accounted: floor at zero, no wrap.
        ctl.update_memory(t, -900).unwrap();
        let stats = ctl.stats(g).unwrap();
        assert_eq!(stats.mem_used, 0);
        assert_eq!(stats.mem_peak, 600);

        ctl.update_memory(t, 50).unwrap();
        ctl.reset_memory_stats(g).unwrap();
        assert_eq!(ctl.stats(g).unwrap().mem_peak, 50);
    }

    #[test]
    fn unbound_tasks_are_never_gated() {
        let ctl = CGroupController::new();
        let t = TaskId::new(42);
        assert!(ctl.check_memory(t, usize::MAX));
        ctl.update_memory(t, -100).unwrap();
        assert!(ctl.can_run(t));
    }

    #[test]
    fn unlimited_sentinels_disable_gating() {
        let ctl = CGroupController::new();
        let g = ctl.create("free", MEM_UNLIMITED, CPU_UNLIMITED, 0).unwrap();
        let t = TaskId::new(1);
        ctl.add_task(g, t).unwrap();

        assert!(ctl.check_memory(t, usize::MAX));
        for now in 1..=3 * WINDOW_TICKS {
            ctl.tick(now, t);
        }
        // No quota, no excess, no penalty.
        assert!(ctl.can_run(t));
        assert_eq!(ctl.stats(g).unwrap().penalty_left, 0);
    }

    #[test]
    fn quota_is_enforced_within_a_window() {
        let ctl = CGroupController::new();
        let g = quota_group(&ctl, 300);
        let t = TaskId::new(1);
        ctl.add_task(g, t).unwrap();

        // Busy loop: the scheduler runs the task whenever admission says
        // yes, idles otherwise.
        for now in 1..WINDOW_TICKS {
            let running = if ctl.can_run(t) { t } else { TaskId::NULL };
            ctl.tick(now, running);
        }
        let used = ctl.stats(g).unwrap().ticks_used;
        assert!(used <= 300, "used {used} ticks of a 300 quota");
        assert!(used >= 270, "used only {used} ticks");
        assert!(!ctl.can_run(t));
    }

    #[test]
    fn window_rollover_accrues_proportional_penalty() {
        let ctl = CGroupController::new();
        let g = quota_group(&ctl, 100);
        let t = TaskId::new(1);
        ctl.add_task(g, t).unwrap();

        // Charge 150 ticks against a 100-tick quota (the scheduler kept
        // running the task past its quota).
        for now in 1..=150 {
            ctl.tick(now, t);
        }
        // Roll the window.
        ctl.tick(WINDOW_TICKS, TaskId::NULL);
        let stats = ctl.stats(g).unwrap();
        assert_eq!(stats.ticks_used, 0);
        assert_eq!(stats.penalty_left, 50 * WINDOW_TICKS / 100);
        assert!(!ctl.can_run(t));
    }

    #[test]
    fn penalty_decays_once_per_non_rollover_tick() {
        let ctl = CGroupController::new();
        let g = quota_group(&ctl, 100);
        let t = TaskId::new(1);
        ctl.add_task(g, t).unwrap();

        for now in 1..=110 {
            ctl.tick(now, t);
        }
        ctl.tick(WINDOW_TICKS, TaskId::NULL);
        let accrued = ctl.stats(g).unwrap().penalty_left;
        assert_eq!(accrued, 10 * WINDOW_TICKS / 100);

        // Each idle tick inside the fresh window decays exactly one.
        ctl.tick(WINDOW_TICKS + 1, TaskId::NULL);
        ctl.tick(WINDOW_TICKS + 2, TaskId::NULL);
        assert_eq!(ctl.stats(g).unwrap().penalty_left, accrued - 2);
    }

    #[test]
    fn totals_and_exact_name_lookup() {
        let ctl = CGroupController::new();
        let a = ctl.create("alpha", MEM_UNLIMITED, 10, 0).unwrap();
        let b = ctl.create("alphabet", MEM_UNLIMITED, 10, 0).unwrap();
        let (ta, tb) = (TaskId::new(1), TaskId::new(2));
        ctl.add_task(a, ta).unwrap();
        ctl.add_task(b, tb).unwrap();
        ctl.update_memory(ta, 100).unwrap();
        ctl.update_memory(tb, 23).unwrap();

        assert_eq!(ctl.total_memory(), 123);
        // Exact match: no prefix aliasing.
        assert_eq!(ctl.get_by_name("alpha"), Some(a));
        assert_eq!(ctl.get_by_name("alphabet"), Some(b));
        assert_eq!(ctl.get_by_name("alph"), None);
    }
}
