//! odrefresh, the on-device refresher of boot and system server artifacts.
//!
//! `odrefresh check` reports whether artifacts are stale, `odrefresh
//! compile` recompiles what is stale, `odrefresh force-compile` discards
//! and recompiles everything, and `odrefresh verify` asks the analyzer
//! whether the existing artifacts are usable. The process exit code is the
//! outcome of the action, or `EX_USAGE` (64) when the arguments or the
//! configuration are unusable.

#![warn(missing_docs)]

mod check;
mod compile;
mod verify;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use odr_config::{load_config, load_config_file, ConfigError, ConfigOverrides, RefreshConfig};
use odr_refresh::USAGE_EXIT_CODE;

/// Directory searched for `odrefresh.toml` when `--config` is not given.
const DEFAULT_CONFIG_DIR: &str = "/system/etc";

/// odrefresh: keeps on-device compiled artifacts in sync with the system.
#[derive(Parser, Debug)]
#[command(
    name = "odrefresh",
    version,
    about = "Refreshes on-device compiled boot and system server artifacts"
)]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `odrefresh.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the artifact directory.
    #[arg(long, global = true)]
    pub artifact_dir: Option<PathBuf>,

    /// Log compiler invocations instead of running them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Recompile everything whenever anything is stale.
    #[arg(long, global = true)]
    pub no_partial_compilation: bool,

    /// Do not refresh the modification time of checked artifacts.
    #[arg(long, global = true)]
    pub no_refresh: bool,

    /// Time budget for all compilations of one run.
    #[arg(long, global = true)]
    pub max_execution_seconds: Option<u64>,

    /// Time limit for a single compiler process.
    #[arg(long, global = true)]
    pub max_child_process_seconds: Option<u64>,

    /// The action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available actions.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Report whether artifacts need compiling.
    Check,
    /// Compile stale artifacts.
    Compile,
    /// Discard all artifacts and compile everything.
    ForceCompile,
    /// Check the existing artifacts with the analyzer.
    Verify,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
    /// Flags that replace configured values.
    pub overrides: ConfigOverrides,
}

impl GlobalArgs {
    /// Collects the global flags of `cli`.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            overrides: ConfigOverrides {
                artifact_dir: cli.artifact_dir.clone(),
                dry_run: cli.dry_run.then_some(true),
                partial_compilation: cli.no_partial_compilation.then_some(false),
                refresh: cli.no_refresh.then_some(false),
                max_execution_seconds: cli.max_execution_seconds,
                max_child_process_seconds: cli.max_child_process_seconds,
            },
        }
    }

    /// Loads the configuration file and applies the overrides.
    pub fn load_config(&self) -> Result<RefreshConfig, ConfigError> {
        let config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => load_config(Path::new(DEFAULT_CONFIG_DIR))?,
        };
        self.overrides.apply(config)
    }
}

fn run(global: &GlobalArgs, command: Command) -> Result<i32, Box<dyn Error>> {
    match command {
        Command::Check => check::run(global),
        Command::Compile => compile::run(global),
        Command::ForceCompile => compile::run_force(global),
        Command::Verify => verify::run(global),
    }
}

/// Maps an action result to the process exit code. Actions only fail before
/// doing any work, when the configuration cannot be loaded.
fn exit_code(result: Result<i32, Box<dyn Error>>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            USAGE_EXIT_CODE
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(USAGE_EXIT_CODE);
        }
    };
    if let Err(e) = odr_cli::logger::init(odr_cli::logger::level(cli.quiet, cli.verbose)) {
        eprintln!("warning: {e}");
    }
    let global = GlobalArgs::from_cli(&cli);
    process::exit(exit_code(run(&global, cli.command)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_subcommands() {
        let cases = [
            ("check", Command::Check),
            ("compile", Command::Compile),
            ("force-compile", Command::ForceCompile),
            ("verify", Command::Verify),
        ];
        for (arg, expected) in cases {
            let cli = Cli::parse_from(["odrefresh", arg]);
            assert_eq!(cli.command, expected);
        }
    }

    #[test]
    fn defaults_override_nothing() {
        let cli = Cli::parse_from(["odrefresh", "check"]);
        let global = GlobalArgs::from_cli(&cli);
        assert!(global.config.is_none());
        assert!(global.overrides.artifact_dir.is_none());
        assert!(global.overrides.dry_run.is_none());
        assert!(global.overrides.partial_compilation.is_none());
        assert!(global.overrides.refresh.is_none());
    }

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::parse_from([
            "odrefresh",
            "compile",
            "--dry-run",
            "--no-partial-compilation",
            "--no-refresh",
            "--max-execution-seconds",
            "300",
            "--max-child-process-seconds=60",
            "--artifact-dir",
            "/data/odrefresh",
        ]);
        let global = GlobalArgs::from_cli(&cli);
        assert_eq!(global.overrides.dry_run, Some(true));
        assert_eq!(global.overrides.partial_compilation, Some(false));
        assert_eq!(global.overrides.refresh, Some(false));
        assert_eq!(global.overrides.max_execution_seconds, Some(300));
        assert_eq!(global.overrides.max_child_process_seconds, Some(60));
        assert_eq!(
            global.overrides.artifact_dir.as_deref(),
            Some(Path::new("/data/odrefresh"))
        );
    }

    #[test]
    fn parse_quiet_and_config() {
        let cli = Cli::parse_from(["odrefresh", "-q", "--config", "/tmp/odrefresh.toml", "verify"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/odrefresh.toml")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["odrefresh", "refresh"]).is_err());
    }

    #[test]
    fn unreadable_config_exits_with_usage_code() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("odrefresh.toml");
        let cli = Cli::parse_from([
            "odrefresh",
            "--config",
            missing.to_str().unwrap(),
            "check",
        ]);
        let global = GlobalArgs::from_cli(&cli);
        for command in [Command::Check, Command::Compile, Command::ForceCompile, Command::Verify] {
            assert_eq!(exit_code(run(&global, command)), USAGE_EXIT_CODE);
        }
    }

    #[test]
    fn action_codes_pass_through() {
        assert_eq!(exit_code(Ok(79)), 79);
        assert_eq!(exit_code(Ok(0)), 0);
    }

    #[test]
    fn config_file_and_overrides_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odrefresh.toml");
        std::fs::write(
            &path,
            r#"
[paths]
artifact_dir = "/data/misc/apexdata/com.android.art/dalvik-cache"
dex2oat = "/apex/com.android.art/bin/dex2oat64"

[compile]
boot_extension_isas = ["arm64"]
system_server_isa = "arm64"
"#,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "odrefresh",
            "--config",
            path.to_str().unwrap(),
            "--dry-run",
            "check",
        ]);
        let config = GlobalArgs::from_cli(&cli).load_config().unwrap();
        assert!(config.compile.dry_run);
        assert!(config.compile.partial_compilation);
    }
}
