//! Scheduler profiling state
//!
//! Three levels, selected at compile time by the scheduler's profile type
//! parameter:
//!
//! - [`NoProfile`]: no timestamps read, tightest loop.
//! - [`BaseProfile`]: one aggregate [`BaseTrace`] across all tasks.
//! - [`TaskProfile`]: aggregate [`FullTrace`] plus a [`TaskTrace`] per slot.
//!
//! Accumulators use wrapping arithmetic throughout: the microsecond counter
//! itself wraps mod 2^32, so saturating math would only hide the wrap.
//! Traces are retrieved take-and-clear, each one covering the window since
//! the previous retrieval.

use super::types::TaskId;

/// Aggregate timing statistics for one trace window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaseTrace {
    /// Scheduler ticks in the window.
    pub iterations: u32,
    /// Time spent inside `loop_once`, sleep excluded, in µs.
    pub scheduling_us: u32,
    /// Time spent executing tasks, in µs.
    pub busy_us: u32,
    /// Time spent in idle sleep, in µs.
    pub idle_sleep_us: u32,
}

/// Per-task timing statistics for one trace window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskTrace {
    /// Cumulative execution time, in µs.
    pub duration_us: u32,
    /// Worst single execution, in µs.
    pub max_duration_us: u32,
    /// Number of firings.
    pub iterations: u32,
}

/// Aggregate statistics accompanying a per-task trace window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FullTrace {
    /// Scheduler ticks in the window.
    pub iterations: u32,
    /// Time spent inside `loop_once`, sleep excluded, in µs.
    pub scheduling_us: u32,
    /// Time spent in idle sleep, in µs.
    pub idle_sleep_us: u32,
    /// Task count the window was recorded against.
    pub task_count: TaskId,
}

/// Profile state of the unprofiled scheduler variant.
#[derive(Debug, Default)]
pub struct NoProfile;

/// Profile state of the aggregate-profiling scheduler variant.
#[derive(Debug, Default)]
pub struct BaseProfile {
    pub(crate) trace: BaseTrace,
}

/// Profile state of the per-task-profiling scheduler variant.
///
/// Task traces are indexed by task id. The window restarts from scratch
/// whenever the task count changes, so statistics from different registry
/// configurations are never mixed.
#[derive(Debug)]
pub struct TaskProfile<const N: usize> {
    pub(crate) trace: FullTrace,
    pub(crate) tasks: [TaskTrace; N],
}

impl<const N: usize> TaskProfile<N> {
    pub(crate) fn reset(&mut self) {
        self.trace = FullTrace::default();
        self.tasks = [TaskTrace::default(); N];
    }
}

impl<const N: usize> Default for TaskProfile<N> {
    fn default() -> Self {
        Self {
            trace: FullTrace::default(),
            tasks: [TaskTrace::default(); N],
        }
    }
}
