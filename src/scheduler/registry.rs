//! Task registry: dynamic attach/detach over a fixed-capacity tracker list
//!
//! The registry owns the loop side of every tracker and borrows the
//! ISR-shared control bank. Ids are positions: task `i` lives in tracker
//! slot `i` and control slot `i`, the occupied slots are always the prefix
//! of the list, and detaching compacts later entries down, re-issuing
//! their ids through [`Task::on_id_updated`].
//!
//! Attach, detach and clear are main-context operations; everything an ISR
//! may do goes through [`TaskControls`] instead.

use heapless::Vec;

use crate::log_debug;

use super::control::TaskControls;
use super::task::{task_ptr, Task};
use super::tracker::TaskTracker;
use super::types::{RegistryError, Result, TaskId, INVALID_TASK_ID};

pub struct TaskRegistry<'a, const N: usize> {
    controls: &'a TaskControls<N>,
    trackers: Vec<TaskTracker<'a>, N>,
}

impl<'a, const N: usize> TaskRegistry<'a, N> {
    /// Bind a registry to its control bank.
    ///
    /// The bank is reset to the empty state, so a bank must serve exactly
    /// one registry at a time.
    pub fn new(controls: &'a TaskControls<N>) -> Self {
        controls.reset_all();
        Self {
            controls,
            trackers: Vec::new(),
        }
    }

    pub fn controls(&self) -> &'a TaskControls<N> {
        self.controls
    }

    /// Register a task and assign it the next id.
    ///
    /// The task is notified of its id before the slot count is published,
    /// then the sleep waker is signaled so a sleeping loop picks the new
    /// task up immediately.
    pub fn attach(
        &mut self,
        task: &'a mut dyn Task,
        period_ms: u32,
        enabled: bool,
        now_ms: u32,
    ) -> Result<TaskId> {
        if self.trackers.is_full() {
            return Err(RegistryError::CapacityExhausted);
        }
        // Exclusive borrows already rule a double attach out for safe
        // callers; the scan guards unsafe ones constructing aliased tasks.
        if self.find(task_ptr(&*task)).is_some() {
            return Err(RegistryError::AlreadyAttached);
        }

        let id = self.trackers.len() as TaskId;
        self.controls.slot(id as usize).bind(period_ms, enabled);

        let mut tracker = TaskTracker::new(task, now_ms);
        tracker.notify_id(id);
        self.controls.mark_hot();
        let pushed = self.trackers.push(tracker);
        debug_assert!(pushed.is_ok());
        self.controls.set_count(self.trackers.len());
        self.controls.waker().signal();

        log_debug!("attached task {} (period {} ms)", id, period_ms);
        Ok(id)
    }

    /// Unregister the task at `id`.
    ///
    /// The outgoing task is notified with [`INVALID_TASK_ID`]; every task
    /// behind it shifts down one slot and is notified of its new id, in
    /// ascending order.
    pub fn detach(&mut self, id: TaskId) -> Result<()> {
        let index = id as usize;
        if index >= self.trackers.len() {
            return Err(RegistryError::InvalidId);
        }

        let count = self.trackers.len();
        let mut removed = self.trackers.remove(index);
        removed.notify_id(INVALID_TASK_ID);

        self.controls.compact_remove(index, count);
        self.controls.set_count(self.trackers.len());
        for i in index..self.trackers.len() {
            self.trackers[i].notify_id(i as TaskId);
        }
        self.controls.mark_hot();

        log_debug!("detached task {}", id);
        Ok(())
    }

    /// Unregister by task reference (linear lookup).
    ///
    /// Only callable with a handle the borrow checker still lets the caller
    /// hold, i.e. one that was never attached here; an attached task is
    /// exclusively borrowed by the registry and is detached by id instead.
    pub fn detach_task(&mut self, task: &dyn Task) -> Result<()> {
        match self.find(task_ptr(task)) {
            Some(index) => self.detach(index as TaskId),
            None => Err(RegistryError::InvalidId),
        }
    }

    /// Unregister everything, notifying each task with [`INVALID_TASK_ID`].
    pub fn clear(&mut self) {
        for tracker in self.trackers.iter_mut() {
            tracker.notify_id(INVALID_TASK_ID);
        }
        self.trackers.clear();
        self.controls.reset_all();
        self.controls.mark_hot();
    }

    /// Id of the given task, if registered.
    pub fn get_task_id(&self, task: &dyn Task) -> Option<TaskId> {
        self.find(task_ptr(task)).map(|index| index as TaskId)
    }

    pub fn task_exists(&self, task: &dyn Task) -> bool {
        self.find(task_ptr(task)).is_some()
    }

    pub fn task_count(&self) -> u8 {
        self.trackers.len() as u8
    }

    pub const fn capacity(&self) -> u8 {
        N as u8
    }

    /// Shortest time in ms until any task is due, stopping the scan as soon
    /// as a tracker reports `bound` or less. `u32::MAX` when nothing is
    /// enabled.
    pub(crate) fn time_until_next_run_bounded(&self, bound: u32, now_ms: u32) -> u32 {
        let mut shortest = u32::MAX;
        for (index, tracker) in self.trackers.iter().enumerate() {
            let period = self.controls.slot(index).effective_period();
            let until = tracker.time_until_next_run(period, now_ms);
            if until < shortest {
                shortest = until;
                if shortest <= bound {
                    break;
                }
            }
        }
        shortest
    }

    /// Shortest time in ms until any task is due.
    pub fn time_until_next_run(&self, now_ms: u32) -> u32 {
        self.time_until_next_run_bounded(0, now_ms)
    }

    /// Roll every tracker's last-run stamp back by `offset_ms`,
    /// compensating for time the loop did not observe (deep sleep).
    pub(crate) fn rollback_all(&mut self, offset_ms: u32) {
        for tracker in self.trackers.iter_mut() {
            tracker.rollback(offset_ms);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.trackers.len()
    }

    /// Evaluate tracker `index` against the current time; runs the task
    /// when due. Caller guarantees `index < len()`.
    pub(crate) fn run_if_due(&mut self, index: usize, clock: &impl crate::platform::Clock) -> bool {
        let slot = self.controls.slot(index);
        self.trackers[index].run_if_due(slot, clock)
    }

    fn find(&self, needle: *const ()) -> Option<usize> {
        self.trackers
            .iter()
            .position(|tracker| tracker.task_ptr() == needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockClock;
    use crate::platform::traits::time::Clock;
    use crate::scheduler::from_fn;
    use crate::scheduler::task::FnTask;

    use core::cell::RefCell;

    /// Task recording every id notification it receives.
    struct IdRecorder<'n> {
        notifications: &'n RefCell<std::vec::Vec<(char, TaskId)>>,
        name: char,
    }

    impl<'n> IdRecorder<'n> {
        fn new(name: char, notifications: &'n RefCell<std::vec::Vec<(char, TaskId)>>) -> Self {
            Self {
                notifications,
                name,
            }
        }
    }

    impl Task for IdRecorder<'_> {
        fn run(&mut self) {}

        fn on_id_updated(&mut self, id: TaskId) {
            self.notifications.borrow_mut().push((self.name, id));
        }
    }

    fn noop_task() -> FnTask<impl FnMut()> {
        from_fn(|| {})
    }

    #[test]
    fn test_attach_assigns_sequential_ids() {
        let controls = TaskControls::<4>::new();
        let mut a = noop_task();
        let mut b = noop_task();
        let mut registry = TaskRegistry::new(&controls);

        assert_eq!(registry.attach(&mut a, 10, true, 0), Ok(0));
        assert_eq!(registry.attach(&mut b, 20, false, 0), Ok(1));
        assert_eq!(registry.task_count(), 2);
        assert!(controls.is_enabled(0));
        assert!(!controls.is_enabled(1));
        assert_eq!(controls.period(1), 20);
    }

    #[test]
    fn test_find_by_identity_key() {
        let controls = TaskControls::<4>::new();
        let mut a = noop_task();
        let mut b = noop_task();
        let mut registry = TaskRegistry::new(&controls);

        // Identity keys survive the attach borrow.
        let a_key = task_ptr(&a);
        let b_key = task_ptr(&b);

        registry.attach(&mut a, 10, true, 0).unwrap();
        assert_eq!(registry.find(a_key), Some(0));
        assert_eq!(registry.find(b_key), None);

        registry.attach(&mut b, 20, true, 0).unwrap();
        assert_eq!(registry.find(b_key), Some(1));

        // Ids hold as long as no earlier task is detached.
        registry.detach(0).unwrap();
        assert_eq!(registry.find(a_key), None);
        assert_eq!(registry.find(b_key), Some(0));
    }

    #[test]
    fn test_attach_rejects_when_full() {
        let controls = TaskControls::<2>::new();
        let mut a = noop_task();
        let mut b = noop_task();
        let mut c = noop_task();
        let mut registry = TaskRegistry::new(&controls);

        registry.attach(&mut a, 0, true, 0).unwrap();
        registry.attach(&mut b, 0, true, 0).unwrap();
        assert_eq!(
            registry.attach(&mut c, 0, true, 0),
            Err(RegistryError::CapacityExhausted)
        );
        assert_eq!(registry.task_count(), 2);
    }

    #[test]
    fn test_attach_signals_waker_and_hot() {
        let controls = TaskControls::<2>::new();
        let mut a = noop_task();
        let mut registry = TaskRegistry::new(&controls);
        controls.clear_hot();
        controls.waker().take();

        registry.attach(&mut a, 0, true, 0).unwrap();
        assert!(controls.is_hot());
        assert!(controls.waker().take());
    }

    #[test]
    fn test_detach_compacts_and_renumbers() {
        let notifications = RefCell::new(std::vec::Vec::new());
        let controls = TaskControls::<4>::new();
        let mut a = IdRecorder::new('a', &notifications);
        let mut b = IdRecorder::new('b', &notifications);
        let mut c = IdRecorder::new('c', &notifications);
        let mut registry = TaskRegistry::new(&controls);

        registry.attach(&mut a, 10, true, 0).unwrap();
        registry.attach(&mut b, 20, true, 0).unwrap();
        registry.attach(&mut c, 30, true, 0).unwrap();
        notifications.borrow_mut().clear();

        registry.detach(0).unwrap();

        assert_eq!(registry.task_count(), 2);
        // Control slots moved with their tasks.
        assert_eq!(controls.period(0), 20);
        assert_eq!(controls.period(1), 30);
        // Outgoing task invalidated first, survivors renumbered in order.
        assert_eq!(
            notifications.borrow().as_slice(),
            &[('a', INVALID_TASK_ID), ('b', 0), ('c', 1)]
        );
    }

    #[test]
    fn test_detach_invalid_id() {
        let controls = TaskControls::<2>::new();
        let mut registry = TaskRegistry::new(&controls);
        assert_eq!(registry.detach(0), Err(RegistryError::InvalidId));
        assert_eq!(registry.detach(INVALID_TASK_ID), Err(RegistryError::InvalidId));
    }

    #[test]
    fn test_detach_task_unknown_reference() {
        let controls = TaskControls::<4>::new();
        let mut a = noop_task();
        let mut stranger = noop_task();
        let mut registry = TaskRegistry::new(&controls);

        registry.attach(&mut a, 10, true, 0).unwrap();
        assert_eq!(
            registry.detach_task(&stranger),
            Err(RegistryError::InvalidId)
        );
        assert_eq!(registry.task_count(), 1);
        stranger.run();
    }

    #[test]
    fn test_attach_detach_round_trip_restores_state() {
        let controls = TaskControls::<4>::new();
        let mut a = noop_task();
        let mut registry = TaskRegistry::new(&controls);

        let id = registry.attach(&mut a, 10, true, 0).unwrap();
        registry.detach(id).unwrap();

        assert_eq!(registry.task_count(), 0);
        assert!(!controls.slot(0).is_enabled());
        assert_eq!(controls.slot(0).period(), 0);
        assert_eq!(registry.time_until_next_run(0), u32::MAX);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let notifications = RefCell::new(std::vec::Vec::new());
        let controls = TaskControls::<4>::new();
        let mut a = IdRecorder::new('a', &notifications);
        let mut b = IdRecorder::new('b', &notifications);
        let mut registry = TaskRegistry::new(&controls);

        registry.attach(&mut a, 10, true, 0).unwrap();
        registry.attach(&mut b, 20, true, 0).unwrap();
        notifications.borrow_mut().clear();

        registry.clear();
        assert_eq!(registry.task_count(), 0);
        assert_eq!(
            notifications.borrow().as_slice(),
            &[('a', INVALID_TASK_ID), ('b', INVALID_TASK_ID)]
        );

        notifications.borrow_mut().clear();
        registry.clear();
        assert_eq!(registry.task_count(), 0);
        assert!(notifications.borrow().is_empty());
    }

    #[test]
    fn test_queries_on_unattached_task() {
        let controls = TaskControls::<4>::new();
        let mut a = noop_task();
        let mut registry = TaskRegistry::new(&controls);
        registry.attach(&mut a, 10, true, 0).unwrap();

        let mut other = noop_task();
        assert_eq!(registry.get_task_id(&other), None);
        assert!(!registry.task_exists(&other));
        other.run();
    }

    #[test]
    fn test_time_until_next_run_picks_minimum() {
        let clock = MockClock::new();
        let controls = TaskControls::<4>::new();
        let mut slow = noop_task();
        let mut fast = noop_task();
        let mut registry = TaskRegistry::new(&controls);

        registry.attach(&mut slow, 500, true, clock.now_ms()).unwrap();
        registry.attach(&mut fast, 40, true, clock.now_ms()).unwrap();

        assert_eq!(registry.time_until_next_run(clock.now_ms()), 40);
        clock.advance_ms(10);
        assert_eq!(registry.time_until_next_run(clock.now_ms()), 30);
    }
}
