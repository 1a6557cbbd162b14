//! Sleep abstraction used by polling loops.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Blocks the caller for a duration.
pub trait Clock {
    /// Sleeps for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Clock backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Clock that advances a counter instead of sleeping.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    elapsed: std::sync::Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    /// Total time slept so far.
    pub(crate) fn elapsed(&self) -> Duration {
        *self
            .elapsed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        let mut elapsed = self
            .elapsed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *elapsed += duration;
    }
}
