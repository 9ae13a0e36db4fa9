//! Fork, exec and wait with an optional deadline.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Command;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::stat::ProcessStat;

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    /// The child exited on its own with this code.
    Exited(i32),
    /// The child was killed by this signal (for example by a cancellation).
    Signaled(i32),
    /// The deadline expired; the child was killed and reaped.
    TimedOut,
    /// The child could not be started.
    StartFailed(String),
}

/// The outcome of one [`run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// How the child ended.
    pub status: ExecStatus,
    /// Resource usage, when it could be read before the child was reaped.
    pub stat: Option<ProcessStat>,
}

impl ExecResult {
    fn start_failed(reason: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::StartFailed(reason.into()),
            stat: None,
        }
    }

    /// Returns `true` if the child exited with code 0.
    pub fn success(&self) -> bool {
        self.status == ExecStatus::Exited(0)
    }

    /// Returns the exit code if the child exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ExecStatus::Exited(code) => Some(code),
            _ => None,
        }
    }
}

/// Options for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Kill the child if it is still running after this long.
    pub timeout: Option<Duration>,
    /// Descriptors the child inherits. They stay owned by the caller.
    pub inherit_fds: Vec<RawFd>,
}

impl ExecOptions {
    /// Options with only a deadline set.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            inherit_fds: Vec::new(),
        }
    }
}

/// Hooks invoked around the lifetime of a child.
///
/// `on_start` runs after the child is spawned and before waiting starts.
/// `on_end` runs once the exit has been observed but before the child is
/// reaped, so the pid cannot have been reused by the time it is called.
pub trait ExecCallbacks {
    /// Called with the pid of the freshly spawned child.
    fn on_start(&self, _pid: i32) {}
    /// Called with the pid of the exited, not yet reaped, child.
    fn on_end(&self, _pid: i32) {}
}

impl ExecCallbacks for () {}

/// Runs `args` and waits for it, killing it after `timeout`.
pub fn run(args: &[String], timeout: Option<Duration>) -> ExecResult {
    run_with_callbacks(args, &ExecOptions::with_timeout(timeout), &())
}

/// Runs `args`, reporting the child pid through `callbacks`.
///
/// The child runs in its own process group. Cancellation is done by the
/// caller killing the pid it got from `on_start`; the wait returns once the
/// child exits for any reason.
pub fn run_with_callbacks(
    args: &[String],
    options: &ExecOptions,
    callbacks: &dyn ExecCallbacks,
) -> ExecResult {
    let Some((program, rest)) = args.split_first() else {
        return ExecResult::start_failed("empty argument vector");
    };
    if let Some(timeout) = options.timeout {
        if timeout.as_millis() > i32::MAX as u128 {
            return ExecResult::start_failed(format!("timeout too large: {timeout:?}"));
        }
    }

    let mut cmd = Command::new(program);
    cmd.args(rest).process_group(0);
    let inherit = options.inherit_fds.clone();
    // SAFETY: the closure only calls fcntl, which is async-signal-safe, and
    // does not allocate.
    unsafe {
        cmd.pre_exec(move || {
            for &fd in &inherit {
                clear_cloexec(fd)?;
            }
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            log::error!("failed to start {program}: {e}");
            return ExecResult::start_failed(e.to_string());
        }
    };
    let pid = child.id() as i32;
    log::debug!("started {program} as pid {pid}");
    callbacks.on_start(pid);

    let timed_out = match options.timeout {
        None => {
            if let Err(e) = wait_for_exit(pid) {
                log::warn!("waitid({pid}) failed: {e}");
            }
            false
        }
        Some(timeout) => wait_with_deadline(pid, timeout),
    };

    let stat = match ProcessStat::read(pid) {
        Ok(stat) => Some(stat),
        Err(e) => {
            log::debug!("no stat for pid {pid}: {e}");
            None
        }
    };
    callbacks.on_end(pid);

    let status = match child.wait() {
        Ok(status) if timed_out => {
            log::warn!("{program} (pid {pid}) timed out, {status}");
            ExecStatus::TimedOut
        }
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => ExecStatus::Exited(code),
            (None, Some(signal)) => ExecStatus::Signaled(signal),
            (None, None) => ExecStatus::StartFailed(format!("unrecognized status {status}")),
        },
        Err(e) => ExecStatus::StartFailed(format!("failed to reap pid {pid}: {e}")),
    };
    ExecResult { status, stat }
}

fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: F_GETFD/F_SETFD on a caller-provided descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Blocks until `pid` exits, leaving it waitable.
fn wait_for_exit(pid: i32) -> io::Result<()> {
    loop {
        // SAFETY: siginfo_t is plain data; waitid fills it in.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid out-pointer.
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn kill(pid: i32) {
    // SAFETY: kill has no memory-safety preconditions. The caller guarantees
    // `pid` is an unreaped child.
    if unsafe { libc::kill(pid, libc::SIGKILL) } != 0 {
        log::warn!("kill({pid}) failed: {}", io::Error::last_os_error());
    }
}

fn pidfd_open(pid: i32) -> io::Result<OwnedFd> {
    // SAFETY: pidfd_open takes a pid and flags and returns a new descriptor.
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: the syscall returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// Waits for `pid` until `timeout`, killing it on expiry. Returns `true` if
/// the deadline expired. The child is always left exited but unreaped.
fn wait_with_deadline(pid: i32, timeout: Duration) -> bool {
    match pidfd_open(pid) {
        Ok(pidfd) => wait_on_pidfd(pid, &pidfd, timeout),
        Err(e) => {
            log::debug!("pidfd_open unavailable ({e}), using watchdog thread");
            wait_with_watchdog(pid, timeout)
        }
    }
}

fn wait_on_pidfd(pid: i32, pidfd: &OwnedFd, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let polled = poll_until(pidfd, deadline);
    finish_wait(pid, polled, deadline)
}

/// Polls `pidfd` until it becomes readable or `deadline` passes. Returns
/// `Ok(true)` on expiry.
fn poll_until(pidfd: &OwnedFd, deadline: Instant) -> io::Result<bool> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut pfd = libc::pollfd {
            fd: pidfd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `pfd` is a valid array of one pollfd.
        let rc = unsafe { libc::poll(&mut pfd, 1, remaining.as_millis() as libc::c_int) };
        match rc {
            0 => return Ok(true),
            n if n > 0 => return Ok(false),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
        }
    }
}

/// Kills and waits for `pid` after a pidfd poll. A failed poll hands the
/// rest of the deadline to the watchdog so the timeout still holds.
fn finish_wait(pid: i32, polled: io::Result<bool>, deadline: Instant) -> bool {
    let timed_out = match polled {
        Ok(timed_out) => timed_out,
        Err(e) => {
            log::warn!("poll on pidfd for {pid} failed ({e}), using watchdog thread");
            let remaining = deadline.saturating_duration_since(Instant::now());
            return wait_with_watchdog(pid, remaining);
        }
    };
    if timed_out {
        kill(pid);
    }
    if let Err(e) = wait_for_exit(pid) {
        log::warn!("waitid({pid}) failed: {e}");
    }
    timed_out
}

fn wait_with_watchdog(pid: i32, timeout: Duration) -> bool {
    let exited = Mutex::new(false);
    let wake = Condvar::new();
    std::thread::scope(|scope| {
        let watchdog = scope.spawn(|| {
            let guard = exited.lock().unwrap_or_else(PoisonError::into_inner);
            let (guard, result) = wake
                .wait_timeout_while(guard, timeout, |done| !*done)
                .unwrap_or_else(PoisonError::into_inner);
            // Killing under the lock keeps the child unreaped until we are done.
            if result.timed_out() && !*guard {
                kill(pid);
                return true;
            }
            false
        });
        if let Err(e) = wait_for_exit(pid) {
            log::warn!("waitid({pid}) failed: {e}");
        }
        *exited.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
        watchdog.join().unwrap_or(false)
    })
}
