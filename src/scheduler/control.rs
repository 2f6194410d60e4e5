//! ISR-safe scheduler control state
//!
//! Everything an interrupt handler may touch lives here, split off from the
//! loop-owned half of the scheduler so both contexts can hold references at
//! once: the loop takes `&mut Scheduler`, ISRs take `&TaskControls` (usually
//! out of a `static`), and every method on this side is `&self`.
//!
//! Sharing discipline:
//! - ISR-writable, loop-readable: each slot's `{enabled, period_ms}` pair,
//!   the hot flag, the sleep waker.
//! - Loop-written: the occupied-slot count (ISRs only read it for the
//!   defensive id bounds check) and slot layout during attach/detach.
//!
//! Reads and writes of the `{enabled, period_ms}` pair are bracketed by
//! `critical_section::with` so the loop never observes a torn pair; lone
//! fields use acquire/release atomics and skip the critical section.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

#[cfg(not(feature = "skip-checks"))]
use crate::log_warn;
use crate::platform::SleepWaker;

use super::types::{TaskId, MAX_TASK_CAPACITY};

/// Period value a slot reports while disabled: never due.
pub(crate) const PERIOD_NEVER: u32 = u32::MAX;

/// Consistent snapshot of one slot, taken at the top of a tracker
/// evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotSnapshot {
    /// Period in ms, or [`PERIOD_NEVER`] when the slot is disabled.
    pub effective_period: u32,
    /// A disabled->enabled transition happened since the last evaluation;
    /// the tracker must re-stamp `last_run_ms` before judging the slot due.
    pub refresh: bool,
}

/// ISR-shared scheduling state of a single tracker slot.
pub(crate) struct SlotControl {
    enabled: AtomicBool,
    period_ms: AtomicU32,
    refresh: AtomicBool,
}

impl SlotControl {
    pub(crate) const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            period_ms: AtomicU32::new(0),
            refresh: AtomicBool::new(false),
        }
    }

    /// Set all fields at once (attach path, main context only).
    pub(crate) fn bind(&self, period_ms: u32, enabled: bool) {
        critical_section::with(|_cs| {
            self.period_ms.store(period_ms, Ordering::Relaxed);
            self.enabled.store(enabled, Ordering::Relaxed);
            // Attach stamps last_run directly; no deferred refresh wanted.
            self.refresh.store(false, Ordering::Relaxed);
        });
    }

    /// Return the slot to its inert state (detached).
    pub(crate) fn reset(&self) {
        self.bind(0, false);
    }

    pub(crate) fn set_period(&self, period_ms: u32) {
        self.period_ms.store(period_ms, Ordering::Release);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        critical_section::with(|_cs| {
            if enabled && !self.enabled.load(Ordering::Relaxed) {
                self.refresh.store(true, Ordering::Relaxed);
            }
            self.enabled.store(enabled, Ordering::Relaxed);
        });
    }

    pub(crate) fn set_period_and_enabled(&self, period_ms: u32, enabled: bool) {
        critical_section::with(|_cs| {
            if enabled && !self.enabled.load(Ordering::Relaxed) {
                self.refresh.store(true, Ordering::Relaxed);
            }
            self.period_ms.store(period_ms, Ordering::Relaxed);
            self.enabled.store(enabled, Ordering::Relaxed);
        });
    }

    /// ISR fast path: make the slot due immediately.
    ///
    /// Two plain release stores, no critical section: the loop reader takes
    /// one, so it cannot interleave with an ISR on a single core, and ISRs
    /// never read the pair back.
    pub(crate) fn wake(&self) {
        self.period_ms.store(0, Ordering::Release);
        self.enabled.store(true, Ordering::Release);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Raw period, regardless of enabled state.
    pub(crate) fn period(&self) -> u32 {
        self.period_ms.load(Ordering::Acquire)
    }

    /// Pair snapshot folding the disabled case into [`PERIOD_NEVER`],
    /// without consuming the refresh flag. Used by sleep-bound queries.
    pub(crate) fn effective_period(&self) -> u32 {
        critical_section::with(|_cs| {
            if self.enabled.load(Ordering::Relaxed) {
                self.period_ms.load(Ordering::Relaxed)
            } else {
                PERIOD_NEVER
            }
        })
    }

    /// Pair snapshot for a tracker evaluation; consumes the refresh flag.
    pub(crate) fn begin_run(&self) -> SlotSnapshot {
        critical_section::with(|_cs| {
            let effective_period = if self.enabled.load(Ordering::Relaxed) {
                self.period_ms.load(Ordering::Relaxed)
            } else {
                PERIOD_NEVER
            };
            let refresh = self.refresh.load(Ordering::Relaxed);
            if refresh {
                self.refresh.store(false, Ordering::Relaxed);
            }
            SlotSnapshot {
                effective_period,
                refresh,
            }
        })
    }

    /// Copy another slot's state into this one (detach compaction, main
    /// context, caller holds the critical section).
    fn copy_from(&self, other: &SlotControl) {
        self.period_ms
            .store(other.period_ms.load(Ordering::Relaxed), Ordering::Relaxed);
        self.enabled
            .store(other.enabled.load(Ordering::Relaxed), Ordering::Relaxed);
        self.refresh
            .store(other.refresh.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

/// ISR-safe control bank for a scheduler of capacity `N`.
///
/// A value type with a `const fn` constructor, so the usual deployment is a
/// `static` the ISRs can name:
///
/// ```rust,ignore
/// static CONTROLS: TaskControls<8> = TaskControls::new();
///
/// #[interrupt]
/// fn EXTI0() {
///     CONTROLS.wake_from_isr(BUTTON_TASK_ID);
/// }
/// ```
///
/// The companion [`Scheduler`] borrows the bank and owns everything else
/// (task references, last-run stamps, traces).
///
/// [`Scheduler`]: super::runner::Scheduler
pub struct TaskControls<const N: usize> {
    slots: [SlotControl; N],
    /// Mirror of the registry's occupied count; written by the loop on
    /// attach/detach, read here only to reject out-of-range ids.
    count: AtomicU8,
    /// Set by any attach, detach, ISR wake or state mutation; cleared by
    /// the scheduler at the top of each tick to gate idle sleep.
    hot: AtomicBool,
    waker: SleepWaker,
}

impl<const N: usize> TaskControls<N> {
    const CAPACITY_OK: () = assert!(N <= MAX_TASK_CAPACITY, "capacity exceeds TaskId range");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::CAPACITY_OK;
        Self {
            slots: [const { SlotControl::new() }; N],
            count: AtomicU8::new(0),
            hot: AtomicBool::new(false),
            waker: SleepWaker::new(),
        }
    }

    /// Registry capacity.
    pub const fn capacity(&self) -> u8 {
        N as u8
    }

    /// Set the task's minimum interval between runs. ISR-safe.
    ///
    /// A period of 0 runs the task on every tick.
    pub fn set_period(&self, id: TaskId, period_ms: u32) {
        let Some(slot) = self.checked_slot(id) else {
            return;
        };
        slot.set_period(period_ms);
        self.mark_hot();
    }

    /// Enable or disable the task. ISR-safe.
    ///
    /// On a disabled->enabled transition the task's last-run stamp is
    /// refreshed on the next tick, so a freshly enabled task with a large
    /// period does not fire immediately.
    pub fn set_enabled(&self, id: TaskId, enabled: bool) {
        let Some(slot) = self.checked_slot(id) else {
            return;
        };
        slot.set_enabled(enabled);
        self.mark_hot();
    }

    /// Set period and enabled state in one consistent update. ISR-safe.
    pub fn set_period_and_enabled(&self, id: TaskId, period_ms: u32, enabled: bool) {
        let Some(slot) = self.checked_slot(id) else {
            return;
        };
        slot.set_period_and_enabled(period_ms, enabled);
        self.mark_hot();
    }

    /// Make the task due immediately and cut any idle sleep short.
    /// ISR-safe fast path.
    pub fn wake_from_isr(&self, id: TaskId) {
        let Some(slot) = self.checked_slot(id) else {
            return;
        };
        slot.wake();
        self.mark_hot();
        self.waker.signal();
    }

    /// Whether the task is currently enabled; `false` for invalid ids.
    pub fn is_enabled(&self, id: TaskId) -> bool {
        match self.checked_slot(id) {
            Some(slot) => slot.is_enabled(),
            None => false,
        }
    }

    /// The task's period in ms; `u32::MAX` for invalid ids.
    pub fn period(&self, id: TaskId) -> u32 {
        match self.checked_slot(id) {
            Some(slot) => slot.period(),
            None => u32::MAX,
        }
    }

    /// The wake signal the idle wait parks on.
    pub fn waker(&self) -> &SleepWaker {
        &self.waker
    }

    #[cfg(not(feature = "skip-checks"))]
    fn checked_slot(&self, id: TaskId) -> Option<&SlotControl> {
        if id >= self.count.load(Ordering::Acquire) {
            log_warn!("scheduler control addressed with invalid task id {}", id);
            return None;
        }
        self.slots.get(id as usize)
    }

    /// With checks skipped, an out-of-range id inside the capacity targets
    /// an inert slot and one beyond it falls off `get`; neither can corrupt
    /// occupied state.
    #[cfg(feature = "skip-checks")]
    fn checked_slot(&self, id: TaskId) -> Option<&SlotControl> {
        self.slots.get(id as usize)
    }

    // ---- loop-side (crate-internal) surface ----

    pub(crate) fn slot(&self, index: usize) -> &SlotControl {
        &self.slots[index]
    }

    pub(crate) fn mark_hot(&self) {
        self.hot.store(true, Ordering::Release);
    }

    pub(crate) fn clear_hot(&self) {
        self.hot.store(false, Ordering::Release);
    }

    pub(crate) fn is_hot(&self) -> bool {
        self.hot.load(Ordering::Acquire)
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.count.store(count as u8, Ordering::Release);
    }

    /// Shift slots `[index + 1, count)` down by one after a detach,
    /// resetting the vacated tail slot. One critical section for the whole
    /// move so an ISR never observes a half-compacted bank.
    pub(crate) fn compact_remove(&self, index: usize, count: usize) {
        critical_section::with(|_cs| {
            for i in index..count.saturating_sub(1) {
                self.slots[i].copy_from(&self.slots[i + 1]);
            }
            if count > 0 {
                self.slots[count - 1].reset();
            }
        });
    }

    /// Reset the whole bank to its detached state.
    pub(crate) fn reset_all(&self) {
        for slot in &self.slots {
            slot.reset();
        }
        self.count.store(0, Ordering::Release);
    }
}

impl<const N: usize> Default for TaskControls<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe handle to the ISR-safe mutators.
///
/// Tasks and interrupt adapters hold `&dyn SchedulerControl` so they never
/// need to name the scheduler's capacity. The application typically hands
/// out `&'static TaskControls<N>` coerced to this trait.
pub trait SchedulerControl {
    fn set_period(&self, id: TaskId, period_ms: u32);
    fn set_enabled(&self, id: TaskId, enabled: bool);
    fn set_period_and_enabled(&self, id: TaskId, period_ms: u32, enabled: bool);
    fn wake_from_isr(&self, id: TaskId);
    fn is_enabled(&self, id: TaskId) -> bool;
    fn period(&self, id: TaskId) -> u32;
}

impl<const N: usize> SchedulerControl for TaskControls<N> {
    fn set_period(&self, id: TaskId, period_ms: u32) {
        TaskControls::set_period(self, id, period_ms)
    }

    fn set_enabled(&self, id: TaskId, enabled: bool) {
        TaskControls::set_enabled(self, id, enabled)
    }

    fn set_period_and_enabled(&self, id: TaskId, period_ms: u32, enabled: bool) {
        TaskControls::set_period_and_enabled(self, id, period_ms, enabled)
    }

    fn wake_from_isr(&self, id: TaskId) {
        TaskControls::wake_from_isr(self, id)
    }

    fn is_enabled(&self, id: TaskId) -> bool {
        TaskControls::is_enabled(self, id)
    }

    fn period(&self, id: TaskId) -> u32 {
        TaskControls::period(self, id)
    }
}
