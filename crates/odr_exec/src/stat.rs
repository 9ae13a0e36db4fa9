//! CPU and wall time accounting read from `/proc`.

use crate::error::ExecError;

/// Resource usage of a finished child, read while it is still a zombie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStat {
    /// Time since the process started.
    pub wall_time_ms: u64,
    /// User and system time of the process and its waited-for children.
    pub cpu_time_ms: u64,
}

impl ProcessStat {
    /// Reads the stat of `pid` from `/proc`.
    ///
    /// Must be called before the process is reaped.
    pub fn read(pid: i32) -> Result<Self, ExecError> {
        let stat_path = format!("/proc/{pid}/stat");
        let stat = read_proc(&stat_path)?;
        let uptime_path = "/proc/uptime".to_string();
        let uptime = read_proc(&uptime_path)?;
        let uptime_ms = parse_uptime_ms(&uptime).ok_or_else(|| ExecError::Malformed {
            path: uptime_path,
            reason: "missing uptime".to_string(),
        })?;
        parse_stat(&stat, clock_ticks_per_second(), uptime_ms).map_err(|reason| {
            ExecError::Malformed {
                path: stat_path,
                reason,
            }
        })
    }
}

fn read_proc(path: &str) -> Result<String, ExecError> {
    std::fs::read_to_string(path).map_err(|e| ExecError::Io {
        path: path.to_string(),
        source: e,
    })
}

fn clock_ticks_per_second() -> u64 {
    // SAFETY: sysconf has no memory-safety preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks <= 0 {
        100
    } else {
        ticks as u64
    }
}

fn parse_uptime_ms(content: &str) -> Option<u64> {
    let seconds: f64 = content.split_whitespace().next()?.parse().ok()?;
    Some((seconds * 1000.0) as u64)
}

/// Parses a `/proc/<pid>/stat` line.
///
/// The command name (field 2) may contain spaces and parentheses, so fields
/// are counted from the last `)`.
pub(crate) fn parse_stat(content: &str, ticks: u64, uptime_ms: u64) -> Result<ProcessStat, String> {
    let rest = content
        .rfind(')')
        .map(|idx| &content[idx + 1..])
        .ok_or_else(|| "missing command name".to_string())?;
    // rest[0] is field 3 (state).
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |number: usize| -> Result<u64, String> {
        let raw = fields
            .get(number - 3)
            .ok_or_else(|| format!("missing field {number}"))?;
        raw.parse::<u64>()
            .map_err(|e| format!("field {number} '{raw}': {e}"))
    };
    let cpu_ticks = field(14)? + field(15)? + field(16)? + field(17)?;
    let start_ticks = field(22)?;
    let ticks = ticks.max(1);
    Ok(ProcessStat {
        wall_time_ms: uptime_ms.saturating_sub(start_ticks * 1000 / ticks),
        cpu_time_ms: cpu_ticks * 1000 / ticks,
    })
}
