//! Timestamped-event interrupt delivery
//!
//! Records the timestamp of the first pending interrupt along with a
//! saturating count of how many landed before the drain. The ISR supplies
//! the timestamp itself (typically from its own µs counter), keeping the
//! line free of any clock dependency.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::scheduler::control::SchedulerControl;
use crate::scheduler::task::Task;
use crate::scheduler::types::{TaskId, INVALID_TASK_ID};

/// Receives timestamped event batches in main context.
pub trait EventListener {
    /// `timestamp` is the stamp passed to the `raise` that opened the
    /// batch; `count` is how many interrupts the batch accumulated.
    fn on_event_interrupt(&mut self, timestamp: u32, count: u8);
}

/// ISR-side half: first-event timestamp, saturating count, task id.
pub struct EventLine {
    timestamp: AtomicU32,
    count: AtomicU8,
    task_id: AtomicU8,
}

impl EventLine {
    pub const fn new() -> Self {
        Self {
            timestamp: AtomicU32::new(0),
            count: AtomicU8::new(0),
            task_id: AtomicU8::new(INVALID_TASK_ID),
        }
    }

    /// Record one interrupt at `timestamp` and wake the draining task.
    /// Safe to call from an ISR.
    ///
    /// The first raise of a batch stores the timestamp and wakes the task;
    /// later raises only bump the count, saturating at `u8::MAX`.
    pub fn raise(&self, timestamp: u32, ctl: &dyn SchedulerControl) {
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            self.timestamp.store(timestamp, Ordering::Release);
            self.count.store(1, Ordering::Release);
            let id = self.task_id.load(Ordering::Acquire);
            if id != INVALID_TASK_ID {
                ctl.wake_from_isr(id);
            }
        } else if count != u8::MAX {
            self.count.store(count + 1, Ordering::Release);
        }
    }

    /// Snapshot and clear the batch. The pair read is consistent because
    /// only the first raise of a batch writes the timestamp, and clearing
    /// the count closes the batch.
    fn drain(&self) -> (u32, u8) {
        critical_section::with(|_cs| {
            let timestamp = self.timestamp.load(Ordering::Relaxed);
            let count = self.count.load(Ordering::Relaxed);
            self.count.store(0, Ordering::Relaxed);
            (timestamp, count)
        })
    }

    fn pending(&self) -> bool {
        self.count.load(Ordering::Acquire) != 0
    }
}

impl Default for EventLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop-side half: drains event batches and notifies the listener.
///
/// Attach with period 0 and disabled, like [`FlagTask`].
///
/// [`FlagTask`]: super::FlagTask
pub struct EventTask<'a, L: EventListener> {
    line: &'a EventLine,
    ctl: &'a dyn SchedulerControl,
    listener: L,
    id: TaskId,
}

impl<'a, L: EventListener> EventTask<'a, L> {
    pub fn new(line: &'a EventLine, ctl: &'a dyn SchedulerControl, listener: L) -> Self {
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

impl<L: EventListener> Task for EventTask<'_, L> {
    fn run(&mut self) {
        let (timestamp, count) = self.line.drain();
        if count > 0 {
            self.listener.on_event_interrupt(timestamp, count);
        }

        self.ctl.set_enabled(self.id, self.line.pending());
    }

    fn on_id_updated(&mut self, id: TaskId) {
        self.id = id;
        self.line.task_id.store(id, Ordering::Release);
    }
}
