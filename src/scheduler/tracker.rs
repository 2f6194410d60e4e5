//! Per-task scheduling state, loop-owned half
//!
//! A tracker pairs the task reference with its last-run stamp. The
//! ISR-shared half of the same slot (`{enabled, period_ms}`) lives in
//! [`SlotControl`]; the tracker pulls a consistent snapshot of it at the
//! top of every evaluation.
//!
//! Timing contract:
//! - Strict late bias: a task with period `N` fires only after *more than*
//!   `N` ms have elapsed, never at exactly `N`. With a 1 ms tick the first
//!   firing after enable lands between `N + 1` and `N + 2` ms.
//! - Phase lock: after a firing, `last_run_ms` advances by the period (not
//!   to the current time), so long-term cadence converges on the period
//!   instead of drifting by per-tick quantization.
//! - Catch-up resync: when more than double the period has passed by the
//!   time the task returns, `last_run_ms` snaps to now instead, preventing
//!   a burst of back-to-back catch-up firings after a long stall.

use crate::platform::Clock;

use super::control::{SlotControl, PERIOD_NEVER};
use super::task::{task_ptr, Task};
use super::types::TaskId;

pub(crate) struct TaskTracker<'a> {
    task: &'a mut dyn Task,
    last_run_ms: u32,
}

impl<'a> TaskTracker<'a> {
    pub(crate) fn new(task: &'a mut dyn Task, now_ms: u32) -> Self {
        Self {
            task,
            last_run_ms: now_ms,
        }
    }

    /// Reference identity of the tracked task.
    pub(crate) fn task_ptr(&self) -> *const () {
        task_ptr(&*self.task)
    }

    pub(crate) fn notify_id(&mut self, id: TaskId) {
        self.task.on_id_updated(id);
    }

    /// Roll the last-run stamp back by `offset` ms (wrapping), making the
    /// task correspondingly closer to (or past) due.
    pub(crate) fn rollback(&mut self, offset_ms: u32) {
        self.last_run_ms = self.last_run_ms.wrapping_sub(offset_ms);
    }

    /// Evaluate the slot and run the task if it is due. Returns whether it
    /// ran.
    pub(crate) fn run_if_due(&mut self, slot: &SlotControl, clock: &impl Clock) -> bool {
        let snapshot = slot.begin_run();
        if snapshot.refresh {
            // Deferred disabled->enabled refresh: restart the phase from
            // the moment the loop observes the transition.
            self.last_run_ms = clock.now_ms();
        }
        let period = snapshot.effective_period;
        if period == PERIOD_NEVER {
            return false;
        }

        let now = clock.now_ms();
        let elapsed = now.wrapping_sub(self.last_run_ms);
        if period != 0 && elapsed <= period {
            return false;
        }

        self.task.run();

        // Re-read the clock: the run itself may have consumed real time,
        // and an overrun must be judged against the task's own exit point.
        let after = clock.now_ms();
        let elapsed_after = after.wrapping_sub(self.last_run_ms);
        if period > 1 && (elapsed_after >> 1) > period {
            // Overrun: resync to now rather than burning ticks catching up.
            self.last_run_ms = after;
        } else {
            self.last_run_ms = self.last_run_ms.wrapping_add(period);
        }
        true
    }

    /// Milliseconds until this tracker next becomes eligible: 0 when due,
    /// `u32::MAX` when disabled.
    pub(crate) fn time_until_next_run(&self, effective_period: u32, now_ms: u32) -> u32 {
        if effective_period == PERIOD_NEVER {
            return u32::MAX;
        }
        if effective_period == 0 {
            return 0;
        }
        let elapsed = now_ms.wrapping_sub(self.last_run_ms);
        if elapsed >= effective_period {
            0
        } else {
            effective_period - elapsed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockClock;
    use crate::scheduler::from_fn;

    fn slot(period_ms: u32, enabled: bool) -> SlotControl {
        let slot = SlotControl::new();
        slot.bind(period_ms, enabled);
        slot
    }

    #[test]
    fn test_disabled_never_runs() {
        let clock = MockClock::new();
        let mut runs = 0;
        let mut task = from_fn(|| runs += 1);
        let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
        let slot = slot(0, false);

        for _ in 0..10 {
            assert!(!tracker.run_if_due(&slot, &clock));
            clock.advance_ms(1);
        }
        drop(tracker);
        assert_eq!(runs, 0);
    }

    #[test]
    fn test_zero_period_runs_every_tick() {
        let clock = MockClock::new();
        let mut runs = 0;
        let mut task = from_fn(|| runs += 1);
        let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
        let slot = slot(0, true);

        for _ in 0..8 {
            assert!(tracker.run_if_due(&slot, &clock));
            clock.advance_ms(1);
        }
        drop(tracker);
        assert_eq!(runs, 8);
    }

    #[test]
    fn test_strict_late_bias() {
        let clock = MockClock::new();
        let mut runs = 0;
        let mut task = from_fn(|| runs += 1);
        let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
        let slot = slot(10, true);

        // Not due at exactly the period boundary.
        clock.advance_ms(10);
        assert!(!tracker.run_if_due(&slot, &clock));
        // Due one tick past it.
        clock.advance_ms(1);
        assert!(tracker.run_if_due(&slot, &clock));
        drop(tracker);
        assert_eq!(runs, 1);
    }

    #[test]
    fn test_phase_locked_cadence() {
        let clock = MockClock::new();
        let mut fired_at: Vec<u32> = Vec::new();
        {
            let mut task = from_fn(|| fired_at.push(clock.now_ms()));
            let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
            let slot = slot(20, true);

            for _ in 0..200 {
                tracker.run_if_due(&slot, &clock);
                clock.advance_ms(1);
            }
        }
        // First firing one past the period, then exactly every period.
        assert_eq!(fired_at[0], 21);
        for pair in fired_at.windows(2) {
            assert_eq!(pair[1] - pair[0], 20);
        }
    }

    #[test]
    fn test_overrun_resyncs_to_run_exit() {
        let clock = MockClock::new();
        let mut fired_at: Vec<u32> = Vec::new();
        let mut spin_once = true;
        {
            let mut task = from_fn(|| {
                fired_at.push(clock.now_ms());
                if spin_once {
                    spin_once = false;
                    // Simulate a run that blocks well past double the period.
                    clock.advance_ms(45);
                }
            });
            let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
            let slot = slot(20, true);

            for _ in 0..100 {
                tracker.run_if_due(&slot, &clock);
                clock.advance_ms(1);
            }
        }
        // First firing at 21, blocking until 66; resync means the second
        // firing is one full period past the exit, not an immediate burst.
        assert_eq!(fired_at[0], 21);
        assert_eq!(fired_at[1], 66 + 21);
        // Normal cadence resumes afterwards.
        assert_eq!(fired_at[2] - fired_at[1], 20);
    }

    #[test]
    fn test_moderate_overrun_catches_up_immediately() {
        let clock = MockClock::new();
        let mut fired_at: Vec<u32> = Vec::new();
        let mut spin_once = true;
        {
            let mut task = from_fn(|| {
                fired_at.push(clock.now_ms());
                if spin_once {
                    spin_once = false;
                    // Blocks past the period but short of the resync bound.
                    clock.advance_ms(15);
                }
            });
            let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
            let slot = slot(20, true);

            for _ in 0..60 {
                tracker.run_if_due(&slot, &clock);
                clock.advance_ms(1);
            }
        }
        // Phase lock holds: the second firing comes as soon as the elapsed
        // time beats the period again, five ticks after the blocking run
        // returns at 36 rather than a full period later.
        assert_eq!(fired_at[0], 21);
        assert_eq!(fired_at[1], 41);
        assert_eq!(fired_at[2], 61);
    }

    #[test]
    fn test_refresh_restarts_phase() {
        let clock = MockClock::new();
        let mut runs = 0;
        let mut task = from_fn(|| runs += 1);
        let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
        let slot = slot(10, false);

        // Long after binding, enable the slot; without the refresh this
        // would fire immediately.
        clock.advance_ms(500);
        slot.set_enabled(true);
        assert!(!tracker.run_if_due(&slot, &clock));
        clock.advance_ms(10);
        assert!(!tracker.run_if_due(&slot, &clock));
        clock.advance_ms(1);
        assert!(tracker.run_if_due(&slot, &clock));
        drop(tracker);
        assert_eq!(runs, 1);
    }

    #[test]
    fn test_time_until_next_run() {
        let clock = MockClock::new();
        let mut task = from_fn(|| {});
        let tracker = TaskTracker::new(&mut task, clock.now_ms());

        assert_eq!(tracker.time_until_next_run(PERIOD_NEVER, 0), u32::MAX);
        assert_eq!(tracker.time_until_next_run(0, 0), 0);
        assert_eq!(tracker.time_until_next_run(10, 0), 10);
        assert_eq!(tracker.time_until_next_run(10, 4), 6);
        assert_eq!(tracker.time_until_next_run(10, 10), 0);
        assert_eq!(tracker.time_until_next_run(10, 500), 0);
    }

    #[test]
    fn test_rollback_wraps() {
        let clock = MockClock::new();
        let mut task = from_fn(|| {});
        let mut tracker = TaskTracker::new(&mut task, clock.now_ms());
        tracker.rollback(100);
        // Stamp wrapped below zero; elapsed math still sees 100 ms gone.
        assert_eq!(tracker.time_until_next_run(150, clock.now_ms()), 50);
    }
}
