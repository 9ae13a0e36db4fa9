//! The on-device refresh loop.
//!
//! [`OnDeviceRefresh`] compares the artifact directory with the installed
//! modules and classpath jars, decides which boot image extensions and
//! system server jars are stale, and recompiles them within a time budget.
//! Boot image extensions form the first tier: a failure there aborts the
//! run. System server jars form the second tier and are compiled in
//! classpath order, each with the preceding jars as its class loader
//! context.

#![warn(missing_docs)]

pub mod analyzer;
pub mod budget;
pub mod cleanup;
pub mod error;
pub mod exit_code;
pub mod layout;
pub mod options;
pub mod refresh;
pub mod space;

pub use analyzer::{analyze, AnalyzerRequest, ANALYSIS_FAILED_EXIT_CODE, INVALID_ARGS_EXIT_CODE};
pub use budget::TimeBudget;
pub use error::RefreshError;
pub use exit_code::{ExitCode, USAGE_EXIT_CODE};
pub use layout::ArtifactLayout;
pub use options::CompilationOptions;
pub use refresh::{CheckResult, OnDeviceRefresh};
