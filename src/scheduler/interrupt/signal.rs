//! Counting-signal interrupt delivery
//!
//! Like the flag adapter, but every raise increments a saturating counter,
//! so the listener learns how many interrupts landed since the last drain.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::scheduler::control::SchedulerControl;
use crate::scheduler::task::Task;
use crate::scheduler::types::{TaskId, INVALID_TASK_ID};

/// Receives accumulated signal counts in main context.
pub trait SignalListener {
    fn on_signal_interrupt(&mut self, count: u8);
}

/// ISR-side half: saturating interrupt counter plus the draining task's id.
pub struct SignalLine {
    count: AtomicU8,
    task_id: AtomicU8,
}

impl SignalLine {
    pub const fn new() -> Self {
        Self {
            count: AtomicU8::new(0),
            task_id: AtomicU8::new(INVALID_TASK_ID),
        }
    }

    /// Count one interrupt and wake the draining task. Safe to call from
    /// an ISR. The count saturates at `u8::MAX` until drained.
    pub fn raise(&self, ctl: &dyn SchedulerControl) {
        // Single-core: an ISR cannot be interleaved by the drain, so a
        // load/store pair is enough for the saturation check.
        let count = self.count.load(Ordering::Acquire);
        if count != u8::MAX {
            self.count.store(count + 1, Ordering::Release);
        }
        let id = self.task_id.load(Ordering::Acquire);
        if id != INVALID_TASK_ID {
            ctl.wake_from_isr(id);
        }
    }

    fn drain(&self) -> u8 {
        self.count.swap(0, Ordering::AcqRel)
    }

    fn pending(&self) -> bool {
        self.count.load(Ordering::Acquire) != 0
    }
}

impl Default for SignalLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop-side half: drains the counter and notifies the listener.
///
/// Attach with period 0 and disabled, like [`FlagTask`].
///
/// [`FlagTask`]: super::FlagTask
pub struct SignalTask<'a, L: SignalListener> {
    line: &'a SignalLine,
    ctl: &'a dyn SchedulerControl,
    listener: L,
    id: TaskId,
}

impl<'a, L: SignalListener> SignalTask<'a, L> {
    pub fn new(line: &'a SignalLine, ctl: &'a dyn SchedulerControl, listener: L) -> Self {
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

impl<L: SignalListener> Task for SignalTask<'_, L> {
    fn run(&mut self) {
        let count = self.line.drain();
        if count > 0 {
            self.listener.on_signal_interrupt(count);
        }

        self.ctl.set_enabled(self.id, self.line.pending());
    }

    fn on_id_updated(&mut self, id: TaskId) {
        self.id = id;
        self.line.task_id.store(id, Ordering::Release);
    }
}
