//! Mock platform implementation for testing
//!
//! Provides a virtual time source so scheduler behavior can be tested
//! deterministically on the host, without real sleeps or real hardware.
//!
//! # Feature Gate
//!
//! Available in two contexts:
//! - During test builds (`#[cfg(test)]`)
//! - When the `mock` feature is enabled

#![cfg(any(test, feature = "mock"))]

mod clock;

pub use clock::MockClock;
