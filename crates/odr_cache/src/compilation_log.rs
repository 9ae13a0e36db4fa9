//! Recent compilation attempts and the backoff between them.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::json::{read_json, write_json};
use crate::error::CacheError;

/// Number of attempts remembered.
pub const MAX_LOG_ENTRIES: usize = 4;

/// Exit code recorded for a successful compilation.
pub const SUCCESS_EXIT_CODE: i32 = 80;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Why a compilation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// The runtime module changed.
    ApexVersionMismatch,
    /// An input jar changed.
    DexFilesChanged,
    /// Artifacts are missing.
    MissingArtifacts,
    /// No recorded reason.
    Unknown,
}

/// One compilation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Version code of the runtime module at the time.
    pub art_version: i64,
    /// Last update time of the runtime module at the time.
    pub last_update_millis: i64,
    /// Why the compilation ran.
    pub trigger: Trigger,
    /// When the attempt started, in seconds since the epoch.
    pub when_secs: u64,
    /// How the attempt ended.
    pub exit_code: i32,
}

impl LogEntry {
    fn succeeded(&self) -> bool {
        self.exit_code == SUCCESS_EXIT_CODE
    }
}

/// The last [`MAX_LOG_ENTRIES`] compilation attempts.
#[derive(Debug, Clone)]
pub struct CompilationLog {
    path: PathBuf,
    entries: VecDeque<LogEntry>,
}

impl CompilationLog {
    /// Loads the log at `path`.
    ///
    /// A missing or unreadable log starts empty, which allows the next
    /// compilation unconditionally.
    pub fn load(path: &Path) -> Self {
        let entries = match read_json::<Vec<LogEntry>>(path) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                log::warn!("discarding compilation log: {e}");
                Vec::new()
            }
        };
        let mut log = Self {
            path: path.to_path_buf(),
            entries: VecDeque::new(),
        };
        for entry in entries {
            log.push(entry);
        }
        log
    }

    /// The remembered attempts, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
    }

    /// Records an attempt, forgetting the oldest one if the log is full.
    pub fn add(&mut self, entry: LogEntry) {
        self.push(entry);
    }

    /// Decides whether a compilation should be attempted now.
    ///
    /// A changed runtime module or changed inputs always allow it. Otherwise
    /// each consecutive failed attempt doubles the wait after the last
    /// attempt, starting from one day.
    pub fn should_attempt_compile(
        &self,
        art_version: i64,
        last_update_millis: i64,
        trigger: Trigger,
        now_secs: u64,
    ) -> bool {
        let Some(last) = self.entries.back() else {
            return true;
        };
        if last.art_version != art_version || last.last_update_millis != last_update_millis {
            return true;
        }
        if matches!(
            trigger,
            Trigger::ApexVersionMismatch | Trigger::DexFilesChanged
        ) {
            return true;
        }
        // The clock moved backwards.
        if now_secs < last.when_secs {
            return true;
        }
        let failures = self
            .entries
            .iter()
            .rev()
            .take_while(|e| !e.succeeded())
            .count() as u32;
        let backoff = SECONDS_PER_DAY << failures.min(MAX_LOG_ENTRIES as u32);
        now_secs - last.when_secs >= backoff
    }

    /// Writes the log back to where it was loaded from.
    pub fn save(&self) -> Result<(), CacheError> {
        let entries: Vec<&LogEntry> = self.entries.iter().collect();
        write_json(&self.path, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(when_secs: u64, exit_code: i32) -> LogEntry {
        LogEntry {
            art_version: 1,
            last_update_millis: 10,
            trigger: Trigger::MissingArtifacts,
            when_secs,
            exit_code,
        }
    }

    fn empty() -> (tempfile::TempDir, CompilationLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = CompilationLog::load(&dir.path().join("log.json"));
        (dir, log)
    }

    #[test]
    fn empty_log_allows_compile() {
        let (_dir, log) = empty();
        assert!(log.should_attempt_compile(1, 10, Trigger::MissingArtifacts, 0));
    }

    #[test]
    fn keeps_last_four() {
        let (_dir, mut log) = empty();
        for i in 0..6 {
            log.add(entry(i, 81));
        }
        let whens: Vec<u64> = log.entries().map(|e| e.when_secs).collect();
        assert_eq!(whens, vec![2, 3, 4, 5]);
    }

    #[test]
    fn version_change_or_input_change_bypasses_backoff() {
        let (_dir, mut log) = empty();
        log.add(entry(100, 81));
        assert!(!log.should_attempt_compile(1, 10, Trigger::MissingArtifacts, 101));
        assert!(log.should_attempt_compile(2, 10, Trigger::MissingArtifacts, 101));
        assert!(log.should_attempt_compile(1, 11, Trigger::MissingArtifacts, 101));
        assert!(log.should_attempt_compile(1, 10, Trigger::DexFilesChanged, 101));
        assert!(log.should_attempt_compile(1, 10, Trigger::ApexVersionMismatch, 101));
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let (_dir, mut log) = empty();
        log.add(entry(0, SUCCESS_EXIT_CODE));
        assert!(!log.should_attempt_compile(1, 10, Trigger::Unknown, SECONDS_PER_DAY - 1));
        assert!(log.should_attempt_compile(1, 10, Trigger::Unknown, SECONDS_PER_DAY));

        let (_dir, mut log) = empty();
        log.add(entry(0, SUCCESS_EXIT_CODE));
        log.add(entry(0, 81));
        log.add(entry(0, 81));
        assert!(!log.should_attempt_compile(1, 10, Trigger::Unknown, 4 * SECONDS_PER_DAY - 1));
        assert!(log.should_attempt_compile(1, 10, Trigger::Unknown, 4 * SECONDS_PER_DAY));
    }

    #[test]
    fn backoff_is_capped() {
        let (_dir, mut log) = empty();
        for _ in 0..4 {
            log.add(entry(0, 81));
        }
        assert!(log.should_attempt_compile(1, 10, Trigger::Unknown, 16 * SECONDS_PER_DAY));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odrefresh/compilation-log.json");
        let mut log = CompilationLog::load(&path);
        log.add(entry(5, SUCCESS_EXIT_CODE));
        log.save().unwrap();

        let reloaded = CompilationLog::load(&path);
        assert_eq!(reloaded.entries().collect::<Vec<_>>(), vec![&entry(5, 80)]);
    }

    #[test]
    fn corrupt_log_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(CompilationLog::load(&path).entries().count(), 0);
    }

    #[test]
    fn trigger_names() {
        assert_eq!(
            serde_json::to_string(&Trigger::ApexVersionMismatch).unwrap(),
            "\"apex-version-mismatch\""
        );
    }
}
