//! Low-power idle wait trait and the wake signal shared with ISRs

use core::sync::atomic::{AtomicBool, Ordering};

/// Binary wake signal for the idle wait.
///
/// The scheduler parks on this through [`IdleWait::idle_wait`]; interrupt
/// handlers give it through [`SleepWaker::signal`] to cut a sleep short.
/// It is the portable analog of the binary semaphore an RTOS port would
/// use, reduced to a single flag because the core only ever needs
/// "something happened since I last looked".
pub struct SleepWaker {
    signaled: AtomicBool,
}

impl SleepWaker {
    pub const fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
        }
    }

    /// Signal the waker. Safe to call from an ISR.
    #[inline]
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    /// Consume a pending signal, returning whether one was pending.
    #[inline]
    pub fn take(&self) -> bool {
        self.signaled.swap(false, Ordering::AcqRel)
    }
}

impl Default for SleepWaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded low-power wait
///
/// `idle_wait` must return no later than `max_ms` milliseconds after entry
/// and must return early when `waker` is signaled. Implementations should
/// consume a pending signal before sleeping, and are expected to bias
/// toward waking early rather than late (e.g. by subtracting one tick of
/// their own granularity from `max_ms`).
///
/// On bare-metal targets this is typically a WFI-style one-tick sleep that
/// ignores `max_ms`; on hosted/RTOS targets, a semaphore wait with timeout.
pub trait IdleWait {
    fn idle_wait(&mut self, waker: &SleepWaker, max_ms: u32);
}
