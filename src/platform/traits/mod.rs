//! Platform abstraction traits
//!
//! This module defines the traits that platform implementations must provide.

pub mod idle;
pub mod time;

pub use idle::{IdleWait, SleepWaker};
pub use time::Clock;
