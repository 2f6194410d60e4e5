//! Flag-based interrupt delivery
//!
//! A single boolean event: interrupts raised before the task drains the
//! flag are coalesced into one notification.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::scheduler::control::SchedulerControl;
use crate::scheduler::task::Task;
use crate::scheduler::types::{TaskId, INVALID_TASK_ID};

/// Receives coalesced flag interrupts in main context.
pub trait FlagListener {
    fn on_flag_interrupt(&mut self);
}

/// ISR-side half: the raised flag plus the current id of the draining task.
pub struct FlagLine {
    raised: AtomicBool,
    task_id: AtomicU8,
}

impl FlagLine {
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
            task_id: AtomicU8::new(INVALID_TASK_ID),
        }
    }

    /// Raise the flag and wake the draining task. Safe to call from an ISR.
    /// Repeated raises before the drain coalesce into one.
    pub fn raise(&self, ctl: &dyn SchedulerControl) {
        if !self.raised.swap(true, Ordering::AcqRel) {
            let id = self.task_id.load(Ordering::Acquire);
            if id != INVALID_TASK_ID {
                ctl.wake_from_isr(id);
            }
        }
    }

    fn drain(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    fn pending(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl Default for FlagLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop-side half: drains the line and notifies the listener.
///
/// Attach with period 0 and disabled; the line enables it on demand:
///
/// ```rust,ignore
/// static CONTROLS: TaskControls<8> = TaskControls::new();
/// static BUTTON: FlagLine = FlagLine::new();
///
/// let mut button_task = FlagTask::new(&BUTTON, &CONTROLS, handler);
/// sched.attach(&mut button_task, 0, false)?;
/// ```
pub struct FlagTask<'a, L: FlagListener> {
    line: &'a FlagLine,
    ctl: &'a dyn SchedulerControl,
    listener: L,
    id: TaskId,
}

impl<'a, L: FlagListener> FlagTask<'a, L> {
    pub fn new(line: &'a FlagLine, ctl: &'a dyn SchedulerControl, listener: L) -> Self {
        Self {
            line,
            ctl,
            listener,
            id: INVALID_TASK_ID,
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }
}

impl<L: FlagListener> Task for FlagTask<'_, L> {
    fn run(&mut self) {
        if self.line.drain() {
            self.listener.on_flag_interrupt();
        }

        // Stay scheduled only if another interrupt landed during the
        // notification.
        self.ctl.set_enabled(self.id, self.line.pending());
    }

    fn on_id_updated(&mut self, id: TaskId) {
        self.id = id;
        self.line.task_id.store(id, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockClock;
    use crate::scheduler::{BasicScheduler, TaskControls};

    use core::cell::Cell;

    struct CountingListener<'c> {
        count: &'c Cell<u32>,
    }

    impl FlagListener for CountingListener<'_> {
        fn on_flag_interrupt(&mut self) {
            self.count.set(self.count.get() + 1);
        }
    }

    #[test]
    fn test_flag_raise_runs_listener_once() {
        let clock = MockClock::new();
        let controls = TaskControls::<2>::new();
        let line = FlagLine::new();
        let count = Cell::new(0);

        let mut task = FlagTask::new(&line, &controls, CountingListener { count: &count });
        let mut sched = BasicScheduler::<_, 2>::new(&controls, &clock);
        let id = sched.attach(&mut task, 0, false).unwrap();

        // Nothing raised: disabled, never runs.
        sched.loop_once();
        assert_eq!(count.get(), 0);

        line.raise(&controls);
        assert!(sched.is_enabled(id));
        sched.loop_once();
        assert_eq!(count.get(), 1);
        // Drained and disarmed again.
        assert!(!sched.is_enabled(id));
        sched.loop_once();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_flag_coalesces_repeated_raises() {
        let clock = MockClock::new();
        let controls = TaskControls::<2>::new();
        let line = FlagLine::new();
        let count = Cell::new(0);

        let mut task = FlagTask::new(&line, &controls, CountingListener { count: &count });
        let mut sched = BasicScheduler::<_, 2>::new(&controls, &clock);
        sched.attach(&mut task, 0, false).unwrap();

        line.raise(&controls);
        line.raise(&controls);
        line.raise(&controls);
        sched.loop_once();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_flag_raise_before_attach_is_harmless() {
        let line = FlagLine::new();
        let controls = TaskControls::<2>::new();
        // No task id yet: the raise must not address slot 255.
        line.raise(&controls);
        assert!(line.pending());
    }
}
