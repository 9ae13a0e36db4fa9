//! Process exit codes of the refresh actions.

use std::fmt;

/// Exit code for unusable arguments or configuration, before any action ran
/// (`EX_USAGE` from `sysexits.h`).
pub const USAGE_EXIT_CODE: i32 = 64;

/// The outcome of a refresh action, used as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    /// Every artifact is up to date, or there was nothing to do.
    Okay,
    /// Some artifacts are stale or missing and should be compiled.
    CompilationRequired,
    /// Every requested compilation succeeded.
    CompilationSuccess,
    /// At least one compilation failed or was not attempted.
    CompilationFailed,
    /// Stale artifacts could not be removed.
    CleanupFailed,
}

impl ExitCode {
    /// The numeric process exit code.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Okay => 0,
            ExitCode::CompilationRequired => 79,
            ExitCode::CompilationSuccess => 80,
            ExitCode::CompilationFailed => 81,
            ExitCode::CleanupFailed => 82,
        }
    }

    /// Returns the lowercase name used in log messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ExitCode::Okay => "okay",
            ExitCode::CompilationRequired => "compilation-required",
            ExitCode::CompilationSuccess => "compilation-success",
            ExitCode::CompilationFailed => "compilation-failed",
            ExitCode::CleanupFailed => "cleanup-failed",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            ExitCode::Okay,
            ExitCode::CompilationRequired,
            ExitCode::CompilationSuccess,
            ExitCode::CompilationFailed,
            ExitCode::CleanupFailed,
        ];
        let mut codes: Vec<i32> = all.iter().map(|c| c.code()).collect();
        codes.dedup();
        assert_eq!(codes, vec![0, 79, 80, 81, 82]);
    }

    #[test]
    fn usage_code_is_below_action_codes() {
        assert_eq!(USAGE_EXIT_CODE, 64);
        assert!(USAGE_EXIT_CODE < ExitCode::CompilationRequired.code());
    }

    #[test]
    fn success_matches_compilation_log() {
        assert_eq!(
            ExitCode::CompilationSuccess.code(),
            odr_cache::SUCCESS_EXIT_CODE
        );
    }
}
