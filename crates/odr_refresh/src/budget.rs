//! The time budget shared by the compilations of one run.

use std::time::{Duration, Instant};

use odr_config::CompileConfig;

/// A deadline for the whole run plus per-child limits.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    deadline: Instant,
    max_child: Duration,
    min_child: Duration,
}

impl TimeBudget {
    /// Starts a budget of `total` from now.
    pub fn new(total: Duration, max_child: Duration, min_child: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            max_child,
            min_child,
        }
    }

    /// Starts the budget configured in `compile`.
    pub fn from_config(compile: &CompileConfig) -> Self {
        Self::new(
            Duration::from_secs(compile.max_execution_seconds),
            Duration::from_secs(compile.max_child_process_seconds),
            Duration::from_secs(compile.min_child_process_seconds),
        )
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The timeout for the next child, or `None` once the budget is spent.
    ///
    /// A child gets the remaining budget capped at the per-child maximum,
    /// but never less than the per-child minimum.
    pub fn child_timeout(&self) -> Option<Duration> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return None;
        }
        Some(remaining.min(self.max_child).max(self.min_child))
    }
}
