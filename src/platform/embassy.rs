//! Clock and idle wait over the embassy-time driver
//!
//! For boards that already run an embassy time driver. The idle wait is a
//! blocking 1 ms-granularity poll of the wake signal; a port that has a
//! real WFI/semaphore path should implement [`IdleWait`] directly instead.

use embassy_time::{Duration, Instant};

use crate::platform::{Clock, IdleWait, SleepWaker};

/// Time source backed by `embassy_time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl EmbassyClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }

    fn now_us(&self) -> u32 {
        Instant::now().as_micros() as u32
    }
}

impl IdleWait for EmbassyClock {
    fn idle_wait(&mut self, waker: &SleepWaker, max_ms: u32) {
        // One tick short of the bound so the wake lands early, never late.
        let mut remaining = max_ms.saturating_sub(1);
        while remaining > 0 {
            if waker.take() {
                return;
            }
            embassy_time::block_for(Duration::from_millis(1));
            remaining -= 1;
        }
    }
}
