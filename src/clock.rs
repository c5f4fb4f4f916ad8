use std::time::{Duration, Instant};

/// Time source used for frame pacing and wait blocks. Injectable so tests
/// can run without wall-clock sleeps.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct SteadyClock;

impl Clock for SteadyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The project timer, reset whenever the project starts.
pub trait Timer {
    /// Seconds since the last reset.
    fn value(&self) -> f64;
    fn reset(&mut self);
}

#[derive(Debug)]
pub struct SteadyTimer {
    start: Instant,
}

impl Default for SteadyTimer {
    fn default() -> Self {
        SteadyTimer {
            start: Instant::now(),
        }
    }
}

impl Timer for SteadyTimer {
    fn value(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn reset(&mut self) {
        self.start = Instant::now();
    }
}
