//! The scheduler loop
//!
//! [`Scheduler`] drives a [`TaskRegistry`] one tick at a time: walk the
//! trackers in index order, run whatever is due, then optionally sleep
//! until the next task comes due. The application owns the scheduler and
//! calls [`loop_once`] from its main loop as often as it can.
//!
//! Two compile-time switches shape the loop:
//!
//! - `IDLE_SLEEP`: when true, a tick that ran nothing and saw no state
//!   mutation (hot flag clear) parks in [`IdleWait::idle_wait`], bounded by
//!   the time until the next due task.
//! - The profile type parameter: [`NoProfile`] reads no timestamps at all,
//!   [`BaseProfile`] accumulates one aggregate trace, [`TaskProfile`] adds
//!   per-task duration/max/count statistics.
//!
//! Timing contract: with a 1 ms tick, a task of period `N` settles into a
//! steady cadence of one firing every `N` ms, offset one tick past the
//! period boundary (strict late bias; see the tracker module).
//!
//! [`loop_once`]: Scheduler::loop_once

use crate::platform::{Clock, IdleWait};

use super::control::TaskControls;
use super::registry::TaskRegistry;
use super::stats::{BaseProfile, BaseTrace, FullTrace, NoProfile, TaskProfile, TaskTrace};
use super::task::Task;
use super::types::{Result, TaskId};

/// Cooperative scheduler over a borrowed ISR control bank.
///
/// The type is a plain value: place the [`TaskControls`] where ISRs can see
/// them (typically a `static`), keep the scheduler itself in `main`, and
/// drive it explicitly. Nothing here is global.
pub struct Scheduler<'a, P, Prof, const N: usize, const IDLE_SLEEP: bool> {
    registry: TaskRegistry<'a, N>,
    platform: P,
    profile: Prof,
}

/// Scheduler without profiling; the tightest loop.
pub type BasicScheduler<'a, P, const N: usize, const IDLE_SLEEP: bool = false> =
    Scheduler<'a, P, NoProfile, N, IDLE_SLEEP>;

/// Scheduler with aggregate profiling ([`BaseTrace`]).
pub type ProfilingScheduler<'a, P, const N: usize, const IDLE_SLEEP: bool = false> =
    Scheduler<'a, P, BaseProfile, N, IDLE_SLEEP>;

/// Scheduler with per-task profiling ([`FullTrace`] + [`TaskTrace`]s).
pub type TaskProfilingScheduler<'a, P, const N: usize, const IDLE_SLEEP: bool = false> =
    Scheduler<'a, P, TaskProfile<N>, N, IDLE_SLEEP>;

impl<'a, P, Prof, const N: usize, const IDLE_SLEEP: bool> Scheduler<'a, P, Prof, N, IDLE_SLEEP>
where
    P: Clock + IdleWait,
    Prof: Default,
{
    /// Bind a scheduler to its control bank and platform.
    pub fn new(controls: &'a TaskControls<N>, platform: P) -> Self {
        Self {
            registry: TaskRegistry::new(controls),
            platform,
            profile: Prof::default(),
        }
    }
}

impl<'a, P, Prof, const N: usize, const IDLE_SLEEP: bool> Scheduler<'a, P, Prof, N, IDLE_SLEEP>
where
    P: Clock + IdleWait,
{
    /// The ISR-safe control bank; hand this to interrupt handlers and to
    /// tasks that reschedule themselves.
    pub fn controls(&self) -> &'a TaskControls<N> {
        self.registry.controls()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &TaskRegistry<'a, N> {
        &self.registry
    }

    /// Register a task; see [`TaskRegistry::attach`].
    pub fn attach(
        &mut self,
        task: &'a mut dyn Task,
        period_ms: u32,
        enabled: bool,
    ) -> Result<TaskId> {
        let now = self.platform.now_ms();
        self.registry.attach(task, period_ms, enabled, now)
    }

    /// Unregister the task at `id`; see [`TaskRegistry::detach`].
    pub fn detach(&mut self, id: TaskId) -> Result<()> {
        self.registry.detach(id)
    }

    /// Unregister by task reference; see [`TaskRegistry::detach_task`].
    pub fn detach_task(&mut self, task: &dyn Task) -> Result<()> {
        self.registry.detach_task(task)
    }

    /// Unregister every task.
    pub fn clear(&mut self) {
        self.registry.clear();
    }

    /// Set a task's period. Main-context convenience over
    /// [`TaskControls::set_period`].
    pub fn set_period(&self, id: TaskId, period_ms: u32) {
        self.controls().set_period(id, period_ms);
    }

    /// Enable or disable a task.
    pub fn set_enabled(&self, id: TaskId, enabled: bool) {
        self.controls().set_enabled(id, enabled);
    }

    /// Set period and enabled state together.
    pub fn set_period_and_enabled(&self, id: TaskId, period_ms: u32, enabled: bool) {
        self.controls().set_period_and_enabled(id, period_ms, enabled);
    }

    /// Make a task due immediately; see [`TaskControls::wake_from_isr`].
    pub fn wake_from_isr(&self, id: TaskId) {
        self.controls().wake_from_isr(id);
    }

    pub fn is_enabled(&self, id: TaskId) -> bool {
        self.controls().is_enabled(id)
    }

    pub fn period(&self, id: TaskId) -> u32 {
        self.controls().period(id)
    }

    pub fn get_task_id(&self, task: &dyn Task) -> Option<TaskId> {
        self.registry.get_task_id(task)
    }

    pub fn task_exists(&self, task: &dyn Task) -> bool {
        self.registry.task_exists(task)
    }

    pub fn task_count(&self) -> u8 {
        self.registry.task_count()
    }

    pub fn capacity(&self) -> u8 {
        self.registry.capacity()
    }

    /// Milliseconds until the next task is due; `u32::MAX` when nothing is
    /// enabled.
    pub fn time_until_next_run(&self) -> u32 {
        self.registry.time_until_next_run(self.platform.now_ms())
    }

    /// Compensate for time the loop did not observe (deep sleep): rolls
    /// every tracker's last-run stamp back by `offset_ms`.
    ///
    /// The subtraction wraps. An offset larger than a task's elapsed
    /// history pushes its stamp past the counter wrap, which the unsigned
    /// elapsed math reads as "long overdue" - exactly what a task should
    /// look like after the device slept through its period.
    pub fn advance_timestamp(&mut self, offset_ms: u32) {
        self.registry.rollback_all(offset_ms);
    }

    /// Run pass shared by every variant: evaluate all trackers in index
    /// order, flag the bank hot if anything ran.
    fn run_pass(&mut self) {
        for index in 0..self.registry.len() {
            if self.registry.run_if_due(index, &self.platform) {
                self.registry.controls().mark_hot();
            }
        }
    }

    /// Idle-sleep policy: nothing ran, no mutation since the top of the
    /// tick, and the next task is more than a millisecond out.
    fn idle_sleep_if_quiet(&mut self) {
        let controls = self.registry.controls();
        if controls.is_hot() {
            return;
        }
        let now = self.platform.now_ms();
        let next = self.registry.time_until_next_run_bounded(1, now);
        // Re-check hot: an ISR may have fired during the scan.
        if next > 1 && !controls.is_hot() {
            self.platform.idle_wait(controls.waker(), next);
        }
    }
}

impl<'a, P, const N: usize, const IDLE_SLEEP: bool> Scheduler<'a, P, NoProfile, N, IDLE_SLEEP>
where
    P: Clock + IdleWait,
{
    /// Run one scheduler tick.
    pub fn loop_once(&mut self) {
        if IDLE_SLEEP {
            self.registry.controls().clear_hot();
            self.run_pass();
            self.idle_sleep_if_quiet();
        } else {
            // No sleep, no hot bookkeeping: the tightest loop.
            for index in 0..self.registry.len() {
                self.registry.run_if_due(index, &self.platform);
            }
        }
    }
}

impl<'a, P, const N: usize, const IDLE_SLEEP: bool> Scheduler<'a, P, BaseProfile, N, IDLE_SLEEP>
where
    P: Clock + IdleWait,
{
    /// Run one scheduler tick, accumulating aggregate timing.
    pub fn loop_once(&mut self) {
        let loop_start = self.platform.now_us();
        let controls = self.registry.controls();
        if IDLE_SLEEP {
            controls.clear_hot();
        }

        // Run all due tasks, measuring busy time around each firing.
        let mut measure = self.platform.now_us();
        for index in 0..self.registry.len() {
            if self.registry.run_if_due(index, &self.platform) {
                let now_us = self.platform.now_us();
                self.profile.trace.busy_us = self
                    .profile
                    .trace
                    .busy_us
                    .wrapping_add(now_us.wrapping_sub(measure));
                controls.mark_hot();
            }
            measure = self.platform.now_us();
        }

        if IDLE_SLEEP && !controls.is_hot() {
            let now = self.platform.now_ms();
            let next = self.registry.time_until_next_run_bounded(1, now);
            if next > 1 && !controls.is_hot() {
                self.platform.idle_wait(controls.waker(), next);
                let now_us = self.platform.now_us();
                self.profile.trace.idle_sleep_us = self
                    .profile
                    .trace
                    .idle_sleep_us
                    .wrapping_add(now_us.wrapping_sub(measure));
            }
        }

        // Sleep time is tracked separately; scheduling stops at the last
        // pre-sleep stamp.
        self.profile.trace.iterations = self.profile.trace.iterations.wrapping_add(1);
        self.profile.trace.scheduling_us = self
            .profile
            .trace
            .scheduling_us
            .wrapping_add(measure.wrapping_sub(loop_start));
    }

    /// Take and clear the accumulated trace. `None` when no tick has run
    /// since the last retrieval.
    pub fn take_trace(&mut self) -> Option<BaseTrace> {
        if self.profile.trace.iterations == 0 {
            return None;
        }
        Some(core::mem::take(&mut self.profile.trace))
    }
}

impl<'a, P, const N: usize, const IDLE_SLEEP: bool> Scheduler<'a, P, TaskProfile<N>, N, IDLE_SLEEP>
where
    P: Clock + IdleWait,
{
    /// Run one scheduler tick, accumulating per-task timing.
    pub fn loop_once(&mut self) {
        let loop_start = self.platform.now_us();
        let controls = self.registry.controls();

        let count = self.registry.task_count();
        if self.profile.trace.iterations == 0 {
            self.profile.trace.task_count = count;
        } else if self.profile.trace.task_count != count {
            // Attach/detach mid-window: restart the window rather than mix
            // statistics from different task configurations.
            self.profile.reset();
            self.profile.trace.task_count = count;
        }

        if IDLE_SLEEP {
            controls.clear_hot();
        }

        for index in 0..count as usize {
            let started = self.platform.now_us();
            if self.registry.run_if_due(index, &self.platform) {
                let duration = self.platform.now_us().wrapping_sub(started);
                controls.mark_hot();

                let task_trace = &mut self.profile.tasks[index];
                task_trace.iterations = task_trace.iterations.wrapping_add(1);
                task_trace.duration_us = task_trace.duration_us.wrapping_add(duration);
                if task_trace.max_duration_us < duration {
                    task_trace.max_duration_us = duration;
                }
            }
        }

        let measure = self.platform.now_us();
        if IDLE_SLEEP && !controls.is_hot() {
            let now = self.platform.now_ms();
            let next = self.registry.time_until_next_run_bounded(1, now);
            if next > 1 && !controls.is_hot() {
                self.platform.idle_wait(controls.waker(), next);
                let now_us = self.platform.now_us();
                self.profile.trace.idle_sleep_us = self
                    .profile
                    .trace
                    .idle_sleep_us
                    .wrapping_add(now_us.wrapping_sub(measure));
            }
        }

        self.profile.trace.iterations = self.profile.trace.iterations.wrapping_add(1);
        self.profile.trace.scheduling_us = self
            .profile
            .trace
            .scheduling_us
            .wrapping_add(measure.wrapping_sub(loop_start));
    }

    /// Take and clear the accumulated traces. Per-task entries are copied
    /// into `out` (truncated to its length), indexed by task id. `None`
    /// when no tick has run since the last retrieval.
    pub fn take_trace(&mut self, out: &mut [TaskTrace]) -> Option<FullTrace> {
        if self.profile.trace.iterations == 0 {
            return None;
        }
        let count = (self.profile.trace.task_count as usize).min(out.len()).min(N);
        out[..count].copy_from_slice(&self.profile.tasks[..count]);

        let trace = self.profile.trace;
        self.profile.reset();
        Some(trace)
    }
}
