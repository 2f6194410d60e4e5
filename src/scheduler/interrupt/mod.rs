//! Interrupt-delivery adapters
//!
//! Thin adapters that carry an interrupt from ISR context into a scheduled
//! task. Each one splits into two halves:
//!
//! - a *line*: atomics the ISR pokes, `const fn`-constructible so it can
//!   live in a `static` next to the [`TaskControls`] bank;
//! - a *task*: a [`Task`] implementation the application attaches with
//!   period 0, disabled; it drains the line, notifies a listener from main
//!   context, and re-arms itself only if more interrupts landed meanwhile.
//!
//! The line tracks the task's current id through `on_id_updated`, so
//! registry compaction never strands an ISR with a stale id.
//!
//! [`TaskControls`]: super::TaskControls
//! [`Task`]: super::Task

mod event;
mod flag;
mod signal;

pub use event::{EventLine, EventListener, EventTask};
pub use flag::{FlagLine, FlagListener, FlagTask};
pub use signal::{SignalLine, SignalListener, SignalTask};
