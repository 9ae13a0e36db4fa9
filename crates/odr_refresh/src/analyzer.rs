//! Whether compiled artifacts are usable as they are.
//!
//! [`analyze`] answers the question in process. The `dexoptanalyzer`
//! binary wraps it and reports the answer as its exit code, and
//! [`AnalyzerRequest::to_args`] builds the command line for that binary.

use std::path::{Path, PathBuf};

use odr_common::{CompilerFilter, InstructionSet};
use odr_dexopt::CmdlineBuilder;
use odr_oat::{
    AssistantOptions, BootImageContext, DexChecksumSource, DexFileInfo, DexOptNeeded,
    DexOptTrigger, HeaderLoader, OatError, OatFileAssistant,
};
use odr_paths::PathError;

/// Exit code of the analyzer for malformed arguments.
pub const INVALID_ARGS_EXIT_CODE: i32 = 101;

/// Exit code of the analyzer when the artifacts could not be inspected.
pub const ANALYSIS_FAILED_EXIT_CODE: i32 = 102;

/// One question for the analyzer: do these sources need recompiling?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerRequest {
    /// Source jars compiled together. The first one names the artifact.
    pub dex_files: Vec<String>,
    /// Target instruction set.
    pub isa: InstructionSet,
    /// Filter the artifact should have been compiled with.
    pub compiler_filter: CompilerFilter,
    /// Side cache holding artifacts compiled on device.
    pub artifact_dir: Option<PathBuf>,
    /// Explicit code artifact, overriding the side cache lookup.
    pub oat_file: Option<PathBuf>,
    /// Expected class loader context.
    pub class_loader_context: Option<String>,
    /// Directory holding the primary boot image, one subdirectory per ISA.
    pub boot_image_dir: PathBuf,
    /// The boot classpath the artifact must have been compiled against.
    pub boot_classpath: Vec<String>,
    /// Only report artifacts compiled with a better filter than requested.
    pub downgrade: bool,
    /// The profile changed since the artifact was compiled.
    pub profile_changed: bool,
}

impl AnalyzerRequest {
    /// The command line asking `analyzer` this question.
    pub fn to_args(&self, analyzer: &Path) -> Vec<String> {
        let mut args = CmdlineBuilder::new();
        args.add(analyzer.to_string_lossy());
        for dex in &self.dex_files {
            args.add(format!("--dex-file={dex}"));
        }
        args.add(format!("--isa={}", self.isa))
            .add(format!("--compiler-filter={}", self.compiler_filter));
        if let Some(dir) = &self.artifact_dir {
            args.add(format!("--artifact-dir={}", dir.display()));
        }
        if let Some(oat) = &self.oat_file {
            args.add(format!("--oat-file={}", oat.display()));
        }
        if let Some(context) = &self.class_loader_context {
            args.add(format!("--class-loader-context={context}"));
        }
        args.add(format!("--boot-image-dir={}", self.boot_image_dir.display()))
            .add_if_non_empty("--boot-classpath=", &self.boot_classpath.join(":"))
            .add_if(self.downgrade, "--downgrade")
            .add_if(self.profile_changed, "--profile-changed");
        args.get().to_vec()
    }

    fn trigger(&self) -> DexOptTrigger {
        if self.downgrade {
            DexOptTrigger::downgrade()
        } else {
            DexOptTrigger::for_dexopt(self.profile_changed, self.compiler_filter)
        }
    }
}

/// Decides whether the artifacts for `request` need recompiling.
pub fn analyze(
    request: &AnalyzerRequest,
    checksums: &dyn DexChecksumSource,
) -> Result<DexOptNeeded, OatError> {
    let location = request.dex_files.first().ok_or(PathError::Empty)?;
    let boot = BootImageContext::fetch(
        &[request.isa],
        &request.boot_classpath,
        &request.boot_image_dir,
        checksums,
    )?;
    let joined = JoinedChecksums {
        location: Path::new(location),
        dex_files: &request.dex_files,
        inner: checksums,
    };
    let defaults = AssistantOptions::default();
    let explicit_location = request.artifact_dir.is_some() || request.oat_file.is_some();
    let options = AssistantOptions {
        dex_parent_writable: explicit_location.then_some(false),
        deny_side_cache: request.artifact_dir.is_none(),
        side_cache_dir: request
            .artifact_dir
            .clone()
            .unwrap_or(defaults.side_cache_dir.clone()),
        oat_location: request.oat_file.clone(),
        ..defaults
    };
    let assistant = OatFileAssistant::new(
        location,
        request.isa,
        request.class_loader_context.as_deref(),
        &boot,
        &joined,
        &HeaderLoader,
        options,
    )?;
    let needed = assistant.dexopt_needed(request.compiler_filter, request.trigger());
    log::debug!(
        "{location} ({}): {:?}, {:?}",
        request.isa,
        assistant.optimization_status(),
        needed
    );
    Ok(needed)
}

/// Presents jars compiled into one artifact as a single source whose
/// checksums are those of every jar in order.
struct JoinedChecksums<'a> {
    location: &'a Path,
    dex_files: &'a [String],
    inner: &'a dyn DexChecksumSource,
}

impl DexChecksumSource for JoinedChecksums<'_> {
    fn dex_file_info(&self, path: &Path) -> Result<DexFileInfo, OatError> {
        if path != self.location || self.dex_files.len() < 2 {
            return self.inner.dex_file_info(path);
        }
        let mut joined = DexFileInfo {
            checksums: Vec::new(),
            uncompressed: true,
        };
        for dex in self.dex_files {
            let info = self.inner.dex_file_info(Path::new(dex))?;
            joined.checksums.extend(info.checksums);
            joined.uncompressed &= info.uncompressed;
        }
        Ok(joined)
    }
}
