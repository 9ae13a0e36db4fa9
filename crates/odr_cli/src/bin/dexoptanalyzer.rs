//! dexoptanalyzer: reports through its exit code whether compiled
//! artifacts of a jar need recompiling.
//!
//! Exit codes 0 to 3 are the kinds of compilation needed (none, from
//! scratch, for the boot image, for the filter). 101 means the arguments
//! were invalid and 102 that the artifacts could not be inspected.

use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use odr_common::{CompilerFilter, InstructionSet};
use odr_oat::{ContentChecksums, OatError};
use odr_refresh::{analyze, AnalyzerRequest, ANALYSIS_FAILED_EXIT_CODE, INVALID_ARGS_EXIT_CODE};

/// Arguments of one analysis.
#[derive(Parser, Debug)]
#[command(
    name = "dexoptanalyzer",
    version,
    about = "Decides whether compiled artifacts need recompiling"
)]
struct Args {
    /// Source jar. Repeat for jars compiled into one artifact.
    #[arg(long = "dex-file", required = true)]
    dex_files: Vec<String>,

    /// Target instruction set.
    #[arg(long)]
    isa: InstructionSet,

    /// Filter the artifact should have been compiled with.
    #[arg(long)]
    compiler_filter: CompilerFilter,

    /// Side cache holding artifacts compiled on device.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Explicit code artifact to inspect.
    #[arg(long)]
    oat_file: Option<PathBuf>,

    /// Expected class loader context.
    #[arg(long)]
    class_loader_context: Option<String>,

    /// Directory holding the primary boot image.
    #[arg(long, default_value = "/apex/com.android.art/javalib")]
    boot_image_dir: PathBuf,

    /// Colon-separated boot classpath.
    #[arg(long, value_delimiter = ':')]
    boot_classpath: Vec<String>,

    /// Only report artifacts compiled with a better filter.
    #[arg(long)]
    downgrade: bool,

    /// The profile changed since the artifact was compiled.
    #[arg(long)]
    profile_changed: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_request(self) -> AnalyzerRequest {
        AnalyzerRequest {
            dex_files: self.dex_files,
            isa: self.isa,
            compiler_filter: self.compiler_filter,
            artifact_dir: self.artifact_dir,
            oat_file: self.oat_file,
            class_loader_context: self.class_loader_context,
            boot_image_dir: self.boot_image_dir,
            boot_classpath: self
                .boot_classpath
                .into_iter()
                .filter(|jar| !jar.is_empty())
                .collect(),
            downgrade: self.downgrade,
            profile_changed: self.profile_changed,
        }
    }
}

/// The exit code for the outcome of an analysis.
fn exit_code(result: Result<odr_oat::DexOptNeeded, OatError>) -> i32 {
    match result {
        Ok(needed) => needed.code(),
        Err(OatError::Path(e)) => {
            log::error!("{e}");
            INVALID_ARGS_EXIT_CODE
        }
        Err(e) => {
            log::error!("{e}");
            ANALYSIS_FAILED_EXIT_CODE
        }
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(INVALID_ARGS_EXIT_CODE);
        }
    };
    let level = odr_cli::logger::level(false, args.verbose);
    if let Err(e) = odr_cli::logger::init(level) {
        eprintln!("warning: {e}");
    }

    let request = args.into_request();
    process::exit(exit_code(analyze(&request, &ContentChecksums)));
}
