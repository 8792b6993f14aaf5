use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock and cooperative-yield source for the long-running loops.
///
/// Scans and searches read `now` to enforce their time budgets and call
/// `yield_now` between batches of pages. Tests swap in a manual clock.
pub trait Scheduler {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
    fn yield_now(&self);
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemScheduler {
    origin: Instant,
}

impl SystemScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for SystemScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn yield_now(&self) {
        (**self).yield_now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
