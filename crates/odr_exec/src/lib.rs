//! Subprocess execution with deadlines and lifecycle callbacks.
//!
//! [`run`] forks a child, waits for it and reports how it ended. A deadline
//! is enforced by polling a pidfd (or by a watchdog thread on kernels without
//! pidfds); an expired deadline kills the child, still reaps it, and reports
//! [`ExecStatus::TimedOut`]. [`ExecCallbacks`] lets a caller learn the child
//! pid before the wait starts and after the exit is observed, which is how
//! cancellation tokens track children without a runner-level cancel API.

#![warn(missing_docs)]

pub mod error;
pub mod runner;
pub mod stat;

pub use error::ExecError;
pub use runner::{run, run_with_callbacks, ExecCallbacks, ExecOptions, ExecResult, ExecStatus};
pub use stat::ProcessStat;
