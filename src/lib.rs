#![cfg_attr(not(test), no_std)]

//! tickmill - Cooperative millisecond-tick task scheduler core
//!
//! This library schedules a fixed-capacity set of user-supplied tasks on a
//! single thread of execution, cooperating with interrupt service routines
//! that may urgently mark work as runnable, and with a platform-provided
//! low-power idle facility.
//!
//! The crate is split the same way the runtime state is split:
//!
//! - [`platform`] - hardware abstraction: monotonic clock, bounded idle
//!   wait, mock implementations for host tests.
//! - [`scheduler`] - the core: ISR-safe control bank, per-task trackers,
//!   registry with position-based ids, and the tick-driving scheduler loop
//!   with its profiling variants.

// Logging abstraction (defmt on embedded targets, println in host tests)
pub mod logging;

// Platform abstraction layer
pub mod platform;

// Scheduler core
pub mod scheduler;

pub use platform::{Clock, IdleWait, SleepWaker};
pub use scheduler::{
    from_fn, BaseProfile, BaseTrace, BasicScheduler, FnTask, FullTrace, NoProfile,
    ProfilingScheduler, RegistryError, Scheduler, SchedulerControl, Task, TaskControls, TaskId,
    TaskProfile, TaskProfilingScheduler, TaskRegistry, TaskTrace, INVALID_TASK_ID,
    MAX_TASK_CAPACITY,
};
