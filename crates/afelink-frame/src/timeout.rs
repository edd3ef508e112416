use std::time::{Duration, Instant};

/// Time budget for assembling one frame.
///
/// Two limits apply: every read is bounded by the budget on its own (catches a
/// stalled line), and the total time since [`start`](TimeoutGuard::start) is
/// checked after each chunk (catches a line that keeps trickling bytes without
/// ever balancing a frame).
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    started: Instant,
    budget: Duration,
}

impl TimeoutGuard {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Bound for a single read.
    pub fn per_read(&self) -> Duration {
        self.budget
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once the total elapsed time is past the budget.
    pub fn expired(&self) -> bool {
        self.elapsed() > self.budget
    }
}
