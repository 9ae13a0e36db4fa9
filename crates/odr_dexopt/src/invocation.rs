//! Compiler invocations: arguments, inherited descriptors and staged outputs.

use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use odr_common::{CompilerFilter, InstructionSet};
use odr_exec::{run_with_callbacks, ExecOptions, ExecStatus};
use odr_paths::ArtifactPaths;
use odr_publish::{commit_all_or_abandon, FsPermission, StagedFile};

use crate::cancel::CancellationToken;
use crate::cmdline::CmdlineBuilder;
use crate::error::DexoptError;
use crate::priority::ResourceHints;

/// Heap bounds passed to the compiler's runtime.
const RUNTIME_HEAP_ARGS: [&str; 2] = ["-Xms64m", "-Xmx512m"];

/// What a finished invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// The run was cancelled and nothing was published.
    pub cancelled: bool,
    /// Wall time of the compiler process.
    pub wall_time_ms: u64,
    /// CPU time of the compiler process and its children.
    pub cpu_time_ms: u64,
    /// Total size of the published files.
    pub size_bytes: u64,
    /// Final paths of the published files.
    pub artifacts: Vec<PathBuf>,
}

/// One compiler run: the argument vector plus the files it reads and writes.
///
/// Inputs stay open and outputs stay staged for as long as the invocation
/// lives, and the child inherits their descriptors. Dropping an invocation
/// without executing it abandons every output.
#[derive(Debug)]
pub struct Dex2oatInvocation {
    args: CmdlineBuilder,
    inputs: Vec<File>,
    outputs: Vec<StagedFile>,
    to_remove: Vec<PathBuf>,
}

impl Dex2oatInvocation {
    /// Starts an invocation of `program`.
    pub fn new(program: &Path) -> Self {
        let mut args = CmdlineBuilder::new();
        args.add(program.to_string_lossy());
        Self {
            args,
            inputs: Vec::new(),
            outputs: Vec::new(),
            to_remove: Vec::new(),
        }
    }

    /// Opens `path` for reading and returns the descriptor the child sees.
    pub fn add_input(&mut self, path: &Path) -> Result<RawFd, DexoptError> {
        let file = File::open(path).map_err(|e| DexoptError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let fd = file.as_raw_fd();
        self.inputs.push(file);
        Ok(fd)
    }

    /// Like [`add_input`](Self::add_input), but a missing file is `None`.
    pub fn add_optional_input(&mut self, path: &Path) -> Result<Option<RawFd>, DexoptError> {
        match self.add_input(path) {
            Ok(fd) => Ok(Some(fd)),
            Err(DexoptError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::debug!("optional input {} is absent", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Stages an output for `path` and returns the descriptor the child
    /// writes to.
    pub fn add_output(
        &mut self,
        path: &Path,
        permission: &FsPermission,
    ) -> Result<RawFd, DexoptError> {
        let staged = StagedFile::create(path, permission)?;
        let fd = staged.fd();
        self.outputs.push(staged);
        Ok(fd)
    }

    /// Deletes `path` when the outputs are published.
    pub fn remove_on_success(&mut self, path: PathBuf) {
        self.to_remove.push(path);
    }

    /// Mutable access to the argument vector.
    pub fn args_mut(&mut self) -> &mut CmdlineBuilder {
        &mut self.args
    }

    /// The argument vector, program first.
    pub fn args(&self) -> &[String] {
        self.args.get()
    }

    /// Final paths of the staged outputs.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .map(|f| f.final_path().to_path_buf())
            .collect()
    }

    /// Runs the compiler and publishes the outputs if it succeeds.
    ///
    /// If `token` is cancelled and the compiler did not exit cleanly, the
    /// outcome is marked cancelled and nothing is published.
    pub fn execute(
        self,
        timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<InvocationOutcome, DexoptError> {
        let Self {
            args,
            inputs,
            outputs,
            to_remove,
        } = self;
        let options = ExecOptions {
            timeout,
            inherit_fds: inputs
                .iter()
                .map(AsRawFd::as_raw_fd)
                .chain(outputs.iter().map(StagedFile::fd))
                .collect(),
        };

        log::info!("running {}", args.get().join(" "));
        let result = run_with_callbacks(args.get(), &options, token);
        let (wall_time_ms, cpu_time_ms) = result
            .stat
            .map(|s| (s.wall_time_ms, s.cpu_time_ms))
            .unwrap_or_default();
        log::debug!("compiler took {wall_time_ms} ms wall, {cpu_time_ms} ms cpu");

        if token.is_cancelled() && !result.success() {
            log::info!("compilation cancelled");
            return Ok(InvocationOutcome {
                cancelled: true,
                wall_time_ms,
                cpu_time_ms,
                ..InvocationOutcome::default()
            });
        }
        match result.status {
            ExecStatus::Exited(0) => {}
            ExecStatus::Exited(code) => return Err(DexoptError::Failed { code }),
            ExecStatus::Signaled(signal) => return Err(DexoptError::Signaled { signal }),
            ExecStatus::TimedOut => return Err(DexoptError::TimedOut),
            ExecStatus::StartFailed(reason) => return Err(DexoptError::StartFailed { reason }),
        }

        let mut size_bytes = 0;
        for output in &outputs {
            size_bytes += output.size()?;
        }
        let artifacts = outputs
            .iter()
            .map(|f| f.final_path().to_path_buf())
            .collect();
        commit_all_or_abandon(outputs, &to_remove)?;
        drop(inputs);

        Ok(InvocationOutcome {
            cancelled: false,
            wall_time_ms,
            cpu_time_ms,
            size_bytes,
            artifacts,
        })
    }

    fn add_common(&mut self, isa: InstructionSet, filter: CompilerFilter, hints: &ResourceHints) {
        self.args
            .add(format!("--instruction-set={isa}"))
            .add(format!("--compiler-filter={filter}"))
            .add("--avoid-storing-invocation");
        hints.add_to(&mut self.args);
    }

    /// Passes `profile` if it exists. Profile-guided filters fall back to
    /// their non-profile equivalent without one.
    fn add_profile(
        &mut self,
        profile: Option<&Path>,
        filter: CompilerFilter,
    ) -> Result<CompilerFilter, DexoptError> {
        if !filter.depends_on_profile() {
            return Ok(filter);
        }
        let fd = match profile {
            Some(path) => self.add_optional_input(path)?,
            None => None,
        };
        match fd {
            Some(fd) => {
                self.args.add(format!("--profile-file-fd={fd}"));
                Ok(filter)
            }
            None => {
                let fallback = filter.non_profile_equivalent();
                log::info!("no profile, compiling with {fallback} instead of {filter}");
                Ok(fallback)
            }
        }
    }

    fn add_boot_classpath(&mut self, boot_classpath: &[String]) -> Result<(), DexoptError> {
        let mut fds = Vec::with_capacity(boot_classpath.len());
        for jar in boot_classpath {
            fds.push(self.add_input(Path::new(jar))?.to_string());
        }
        self.args
            .add_runtime(format!("-Xbootclasspath:{}", boot_classpath.join(":")))
            .add_runtime(format!("-Xbootclasspathfds:{}", fds.join(":")));
        Ok(())
    }

    /// Builds the invocation compiling the boot image extension for one
    /// instruction set.
    pub fn boot_extension(dex2oat: &Path, unit: &BootExtensionUnit) -> Result<Self, DexoptError> {
        let mut inv = Self::new(dex2oat);
        for arg in RUNTIME_HEAP_ARGS {
            inv.args.add_runtime(arg);
        }
        inv.add_boot_classpath(&unit.boot_classpath)?;

        let mut dex_fds = Vec::with_capacity(unit.dex_files.len());
        for jar in &unit.dex_files {
            dex_fds.push((jar, inv.add_input(Path::new(jar))?));
        }
        for (jar, fd) in dex_fds {
            inv.args
                .add(format!("--dex-file={jar}"))
                .add(format!("--dex-fd={fd}"));
        }
        let filter = inv.add_profile(unit.profile.as_deref(), unit.compiler_filter)?;
        if let Some(image) = &unit.primary_boot_image {
            inv.args
                .add(format!("--boot-image={}", image.display()));
        }

        let image_fd = inv.add_output(&unit.outputs.image, &unit.permission)?;
        let oat_fd = inv.add_output(&unit.outputs.code, &unit.permission)?;
        let vdex_fd = inv.add_output(&unit.outputs.metadata, &unit.permission)?;
        inv.args
            .add(format!("--image-fd={image_fd}"))
            .add(format!("--oat-fd={oat_fd}"))
            .add(format!("--output-vdex-fd={vdex_fd}"))
            .add(format!("--oat-location={}", unit.outputs.code.display()))
            .add("--single-image")
            .add("--image-format=lz4");
        inv.add_common(unit.isa, filter, &unit.hints);
        Ok(inv)
    }

    /// Builds the invocation compiling one system server jar.
    pub fn system_server(dex2oat: &Path, unit: &SystemServerUnit) -> Result<Self, DexoptError> {
        let mut inv = Self::new(dex2oat);
        for arg in RUNTIME_HEAP_ARGS {
            inv.args.add_runtime(arg);
        }
        inv.add_boot_classpath(&unit.boot_classpath)?;

        let dex_fd = inv.add_input(Path::new(&unit.jar))?;
        inv.args
            .add(format!("--dex-file={}", unit.jar))
            .add(format!("--dex-fd={dex_fd}"));
        let filter = inv.add_profile(unit.profile.as_deref(), unit.compiler_filter)?;

        let mut context_fds = Vec::with_capacity(unit.context_jars.len());
        for jar in &unit.context_jars {
            context_fds.push(inv.add_input(Path::new(jar))?.to_string());
        }
        inv.args
            .add(format!("--class-loader-context={}", unit.class_loader_context))
            .add_if_non_empty("--class-loader-context-fds=", &context_fds.join(":"));
        let boot_images = unit
            .boot_images
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join(":");
        inv.args.add_if_non_empty("--boot-image=", &boot_images);

        let oat_fd = inv.add_output(&unit.outputs.code, &unit.permission)?;
        let vdex_fd = inv.add_output(&unit.outputs.metadata, &unit.permission)?;
        inv.args
            .add(format!("--oat-fd={oat_fd}"))
            .add(format!("--output-vdex-fd={vdex_fd}"))
            .add(format!("--oat-location={}", unit.outputs.code.display()));
        if unit.generate_app_image {
            let image_fd = inv.add_output(&unit.outputs.image, &unit.permission)?;
            inv.args
                .add(format!("--app-image-fd={image_fd}"))
                .add("--image-format=lz4");
        } else {
            inv.remove_on_success(unit.outputs.image.clone());
        }
        inv.add_common(unit.isa, filter, &unit.hints);
        Ok(inv)
    }
}

/// Inputs for compiling a boot image extension.
#[derive(Debug, Clone)]
pub struct BootExtensionUnit {
    /// Target instruction set.
    pub isa: InstructionSet,
    /// The jars compiled into the extension.
    pub dex_files: Vec<String>,
    /// The complete boot classpath seen by the compiler.
    pub boot_classpath: Vec<String>,
    /// The primary boot image the extension extends, if present.
    pub primary_boot_image: Option<PathBuf>,
    /// Boot image profile.
    pub profile: Option<PathBuf>,
    /// Requested filter.
    pub compiler_filter: CompilerFilter,
    /// Where the image, code and metadata go.
    pub outputs: ArtifactPaths,
    /// CPU placement and parallelism.
    pub hints: ResourceHints,
    /// Permission of the published files.
    pub permission: FsPermission,
}

/// Inputs for compiling one system server jar.
#[derive(Debug, Clone)]
pub struct SystemServerUnit {
    /// Target instruction set.
    pub isa: InstructionSet,
    /// The jar to compile.
    pub jar: String,
    /// Class loader context, such as `PCL[/system/framework/a.jar]`.
    pub class_loader_context: String,
    /// The jars named by the context, passed as descriptors.
    pub context_jars: Vec<String>,
    /// The complete boot classpath seen by the compiler.
    pub boot_classpath: Vec<String>,
    /// Boot images to compile against, primary first.
    pub boot_images: Vec<PathBuf>,
    /// Profile for the jar.
    pub profile: Option<PathBuf>,
    /// Requested filter.
    pub compiler_filter: CompilerFilter,
    /// Where the image, code and metadata go.
    pub outputs: ArtifactPaths,
    /// Produce an app image. Otherwise a stale image is deleted.
    pub generate_app_image: bool,
    /// CPU placement and parallelism.
    pub hints: ResourceHints,
    /// Permission of the published files.
    pub permission: FsPermission,
}

/// The parent-first context for a jar loaded after `preceding`.
pub fn class_loader_context(preceding: &[String]) -> String {
    format!("PCL[{}]", preceding.join(":"))
}
