//! Platform abstraction layer
//!
//! This module isolates every assumption the scheduler core makes about the
//! hardware: a monotonic time source and a bounded low-power wait. All
//! platform-specific code lives behind these traits; the core itself never
//! touches a peripheral.

pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "embassy")]
mod embassy;

pub use traits::{Clock, IdleWait, SleepWaker};

#[cfg(feature = "embassy")]
pub use embassy::EmbassyClock;
