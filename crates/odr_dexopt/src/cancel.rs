//! Cooperative cancellation of running compilers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use odr_exec::ExecCallbacks;

#[derive(Debug, Default)]
struct State {
    cancelled: bool,
    pids: HashSet<i32>,
}

/// Kills every child started under it once cancelled.
///
/// Clones share state. Cancellation cannot be undone. Children register
/// themselves through the [`ExecCallbacks`] implementation, and every kill
/// happens under the same lock as registration, so a child is either killed
/// by [`cancel`](Self::cancel) or by its own `on_start`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<Mutex<State>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the token and kills every registered child.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        for &pid in &state.pids {
            kill(pid);
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Number of children currently registered.
    pub fn running(&self) -> usize {
        self.lock().pids.len()
    }
}

impl ExecCallbacks for CancellationToken {
    fn on_start(&self, pid: i32) {
        let mut state = self.lock();
        state.pids.insert(pid);
        if state.cancelled {
            kill(pid);
        }
    }

    fn on_end(&self, pid: i32) {
        self.lock().pids.remove(&pid);
    }
}

fn kill(pid: i32) {
    // SAFETY: kill has no memory-safety preconditions. Registered pids
    // belong to unreaped children, so they cannot have been reused.
    if unsafe { libc::kill(pid, libc::SIGKILL) } != 0 {
        log::warn!(
            "failed to kill pid {pid}: {}",
            std::io::Error::last_os_error()
        );
    } else {
        log::info!("killed pid {pid}");
    }
}
