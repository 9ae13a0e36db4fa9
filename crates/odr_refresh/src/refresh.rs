//! The refresh actions: check, compile, force-compile and verify.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use odr_cache::{
    check_components, check_system_server_components, read_module_list, ApexInfo, CacheInfo,
    Component, ModuleInfo, SystemServerComponent, Trigger, ART_MODULE,
};
use odr_common::{CompilerFilter, InstructionSet};
use odr_config::RefreshConfig;
use odr_dexopt::{
    class_loader_context, BootExtensionUnit, CancellationToken, Dex2oatInvocation,
    PriorityClass, ResourceHints, SystemServerUnit,
};
use odr_exec::{ExecOptions, ExecStatus};
use odr_oat::{ContentChecksums, DexChecksumSource, DexOptNeeded};
use odr_paths::prebuilt_profile_path;
use odr_publish::{create_dir_with_permission, FsPermission};

use crate::analyzer::{analyze, AnalyzerRequest};
use crate::budget::TimeBudget;
use crate::cleanup::{remove_dir, remove_unexpected};
use crate::error::RefreshError;
use crate::exit_code::ExitCode;
use crate::layout::ArtifactLayout;
use crate::options::CompilationOptions;
use crate::space::{ensure_available, MIN_FREE_BYTES};

/// The outcome of [`OnDeviceRefresh::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// `Okay`, `CompilationRequired` or `CleanupFailed`.
    pub exit_code: ExitCode,
    /// The units to compile.
    pub options: CompilationOptions,
    /// The first reason a unit was marked, if any was.
    pub trigger: Option<Trigger>,
}

impl CheckResult {
    fn up_to_date() -> Self {
        Self {
            exit_code: ExitCode::Okay,
            options: CompilationOptions::default(),
            trigger: None,
        }
    }
}

#[derive(Debug, Default)]
struct CheckState {
    options: CompilationOptions,
    trigger: Option<Trigger>,
    checked: BTreeSet<PathBuf>,
}

impl CheckState {
    fn note(&mut self, trigger: Trigger) {
        self.trigger.get_or_insert(trigger);
    }
}

/// One system server jar and the jars loaded before it.
#[derive(Debug, Clone)]
struct SystemServerJob {
    jar: String,
    context_jars: Vec<String>,
    in_classpath: bool,
}

/// Checks and refreshes the artifacts described by a [`RefreshConfig`].
pub struct OnDeviceRefresh {
    config: RefreshConfig,
    checksums: Box<dyn DexChecksumSource>,
    token: CancellationToken,
    permission: FsPermission,
}

impl OnDeviceRefresh {
    /// Creates a refresher fingerprinting jars by content.
    pub fn new(config: RefreshConfig) -> Self {
        Self {
            config,
            checksums: Box::new(ContentChecksums),
            token: CancellationToken::new(),
            permission: FsPermission::world_readable(),
        }
    }

    /// Replaces the source of jar checksums.
    pub fn with_checksums(mut self, checksums: Box<dyn DexChecksumSource>) -> Self {
        self.checksums = checksums;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// A handle that cancels the running compilation from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The runtime module from the module list.
    pub fn art_module(&self) -> Result<ApexInfo, RefreshError> {
        read_module_list(&self.config.paths.apex_info_list)?
            .into_iter()
            .find(|module| module.name == ART_MODULE)
            .ok_or_else(|| RefreshError::MissingModule {
                name: ART_MODULE.to_string(),
            })
    }

    fn layout(&self) -> ArtifactLayout<'_> {
        ArtifactLayout::new(&self.config)
    }

    fn artifact_dir(&self) -> &Path {
        &self.config.paths.artifact_dir
    }

    /// Decides which artifacts are stale.
    ///
    /// With partial compilation enabled, files the check did not vouch for
    /// are removed from the artifact directory and only stale units are
    /// marked. Otherwise any staleness discards the whole directory.
    pub fn check(&self) -> CheckResult {
        let modules = match read_module_list(&self.config.paths.apex_info_list) {
            Ok(modules) => modules,
            Err(e) => {
                log::warn!("cannot read module list: {e}");
                return self.cleanup_and_compile_all(Trigger::Unknown);
            }
        };
        let Some(art) = modules.iter().find(|module| module.name == ART_MODULE) else {
            log::warn!("{ART_MODULE} is not in the module list");
            return self.cleanup_and_compile_all(Trigger::Unknown);
        };
        let cache_info = match CacheInfo::load(self.artifact_dir()) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("discarding artifacts: {e}");
                return self.cleanup_and_compile_all(Trigger::MissingArtifacts);
            }
        };
        if cache_info.is_none() {
            log::info!("no cache info in {}", self.artifact_dir().display());
        }

        let mut state = CheckState::default();
        let system_server_isa = self.config.compile.system_server_isa;
        for &isa in &self.config.compile.boot_extension_isas {
            if let Some(trigger) =
                self.check_boot_extension(isa, art, cache_info.as_ref(), &mut state.checked)
            {
                log::info!("boot image extension for {isa} needs compiling ({trigger:?})");
                state.note(trigger);
                state.options.boot_isas.insert(isa);
                if isa == system_server_isa {
                    state.options.mark_all_system_server_jars(&self.config);
                }
            }
        }
        if !state.options.boot_isas.contains(&system_server_isa) {
            self.check_system_server(&modules, cache_info.as_ref(), &mut state);
        }

        if state.options.is_empty() {
            log::info!("artifacts are up to date");
            return CheckResult::up_to_date();
        }
        let trigger = state.trigger.unwrap_or(Trigger::Unknown);
        if !self.config.compile.partial_compilation {
            return self.cleanup_and_compile_all(trigger);
        }

        if self.config.compile.refresh {
            refresh_mtimes(&state.checked);
        }
        let mut keep = state.checked;
        keep.insert(CacheInfo::path(self.artifact_dir()));
        match remove_unexpected(self.artifact_dir(), &keep) {
            Ok(removed) => log::debug!("removed {removed} unexpected files"),
            Err(e) => {
                log::warn!("partial cleanup failed: {e}");
                return self.cleanup_and_compile_all(trigger);
            }
        }
        CheckResult {
            exit_code: ExitCode::CompilationRequired,
            options: state.options,
            trigger: Some(trigger),
        }
    }

    fn cleanup_and_compile_all(&self, trigger: Trigger) -> CheckResult {
        if let Err(e) = remove_dir(self.artifact_dir()) {
            log::error!("cannot remove artifacts: {e}");
            return CheckResult {
                exit_code: ExitCode::CleanupFailed,
                options: CompilationOptions::default(),
                trigger: Some(trigger),
            };
        }
        CheckResult {
            exit_code: ExitCode::CompilationRequired,
            options: CompilationOptions::all(&self.config),
            trigger: Some(trigger),
        }
    }

    /// Returns why the boot image extension of `isa` needs compiling, if
    /// it does. Usable artifacts are added to `checked`.
    fn check_boot_extension(
        &self,
        isa: InstructionSet,
        art: &ApexInfo,
        cache_info: Option<&CacheInfo>,
        checked: &mut BTreeSet<PathBuf>,
    ) -> Option<Trigger> {
        let layout = self.layout();
        let paths = match layout.boot_extension(isa) {
            Ok(Some(paths)) => paths,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("cannot locate boot image extension for {isa}: {e}");
                return Some(Trigger::Unknown);
            }
        };
        if art.is_factory {
            if let Ok(Some(system)) = layout.system_boot_extension(isa) {
                if system.iter().all(Path::is_file) {
                    log::debug!("using boot image extension on system for {isa}");
                    return None;
                }
            }
        }

        let Some(cache_info) = cache_info else {
            return Some(Trigger::MissingArtifacts);
        };
        if cache_info.art_module != ModuleInfo::from(art) {
            log::info!(
                "{ART_MODULE} changed from version {} to {}",
                cache_info.art_module.version_code,
                art.version_code
            );
            return Some(Trigger::ApexVersionMismatch);
        }
        let compilable = self.config.boot_extension_compilable_jars();
        let mismatch = Component::from_jars(&compilable, &*self.checksums)
            .map_err(|e| e.to_string())
            .and_then(|current| {
                check_components(&cache_info.dex2oat_boot_classpath, &current)
                    .map_err(|m| m.to_string())
            });
        if let Err(reason) = mismatch {
            log::info!("boot classpath changed: {reason}");
            return Some(Trigger::DexFilesChanged);
        }

        if !paths.iter().all(Path::is_file) {
            return Some(Trigger::MissingArtifacts);
        }
        checked.extend(paths.iter().map(Path::to_path_buf));
        None
    }

    fn check_system_server(
        &self,
        modules: &[ApexInfo],
        cache_info: Option<&CacheInfo>,
        state: &mut CheckState,
    ) {
        let mismatch = match cache_info {
            None => Some((Trigger::MissingArtifacts, "no cache info".to_string())),
            Some(info) => self.system_server_mismatch(modules, info),
        };
        if let Some((trigger, reason)) = mismatch {
            log::info!("system server artifacts need compiling: {reason}");
            state.note(trigger);
            state.options.mark_all_system_server_jars(&self.config);
            return;
        }

        let layout = self.layout();
        for jar in self.config.all_system_server_jars() {
            let paths = match layout.system_server(&jar) {
                Ok(paths) => paths,
                Err(e) => {
                    log::warn!("cannot locate artifacts of {jar}: {e}");
                    state.note(Trigger::Unknown);
                    state.options.system_server_jars.insert(jar);
                    continue;
                }
            };
            if paths.code.is_file() && paths.metadata.is_file() {
                if paths.image.is_file() {
                    state.checked.insert(paths.image);
                }
                state.checked.insert(paths.code);
                state.checked.insert(paths.metadata);
            } else {
                log::info!("artifacts of {jar} are missing");
                state.note(Trigger::MissingArtifacts);
                state.options.system_server_jars.insert(jar);
            }
        }
    }

    fn system_server_mismatch(
        &self,
        modules: &[ApexInfo],
        info: &CacheInfo,
    ) -> Option<(Trigger, String)> {
        if info.modules != ModuleInfo::from_list(modules) {
            return Some((Trigger::ApexVersionMismatch, "modules changed".to_string()));
        }
        let classpath = &self.config.classpath;
        let boot = Component::from_jars(&classpath.boot_classpath, &*self.checksums)
            .map_err(|e| e.to_string())
            .and_then(|current| {
                check_components(&info.boot_classpath, &current).map_err(|m| m.to_string())
            });
        if let Err(reason) = boot {
            return Some((Trigger::DexFilesChanged, format!("boot classpath: {reason}")));
        }
        let system_server = SystemServerComponent::from_jars(
            &classpath.system_server_classpath,
            &classpath.standalone_system_server_jars,
            &*self.checksums,
        )
        .map_err(|e| e.to_string())
        .and_then(|current| {
            check_system_server_components(&info.system_server, &current)
                .map_err(|m| m.to_string())
        });
        if let Err(reason) = system_server {
            return Some((Trigger::DexFilesChanged, format!("system server: {reason}")));
        }
        None
    }

    /// Compiles the units in `options`.
    ///
    /// Boot image extensions are compiled first and any failure there ends
    /// the run. System server jars follow in classpath order; a failed jar
    /// does not stop the others.
    pub fn compile(&self, options: &CompilationOptions) -> ExitCode {
        if options.is_empty() {
            log::info!("nothing to compile");
            return ExitCode::Okay;
        }
        if let Err(e) = self.prepare() {
            log::error!("cannot compile: {e}");
            return ExitCode::CompilationFailed;
        }

        let budget = TimeBudget::from_config(&self.config.compile);
        for &isa in &options.boot_isas {
            if let Err(e) = self.compile_boot_extension(isa, &budget) {
                log::error!("compiling boot image extension for {isa} failed: {e}");
                return ExitCode::CompilationFailed;
            }
        }

        let mut failed = 0;
        let jobs = self
            .system_server_jobs()
            .into_iter()
            .filter(|job| options.system_server_jars.contains(&job.jar));
        for job in jobs {
            match self.compile_system_server(&job, &budget) {
                Ok(()) => {}
                Err(e @ (RefreshError::BudgetExhausted | RefreshError::Cancelled)) => {
                    log::error!("compiling {} failed: {e}", job.jar);
                    return ExitCode::CompilationFailed;
                }
                Err(e) => {
                    log::error!("compiling {} failed: {e}", job.jar);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            log::error!("{failed} system server jars failed to compile");
            return ExitCode::CompilationFailed;
        }
        ExitCode::CompilationSuccess
    }

    /// Discards every artifact and compiles everything.
    pub fn force_compile(&self) -> ExitCode {
        if let Err(e) = remove_dir(self.artifact_dir()) {
            log::error!("cannot remove artifacts: {e}");
            return ExitCode::CleanupFailed;
        }
        self.compile(&CompilationOptions::all(&self.config))
    }

    fn prepare(&self) -> Result<(), RefreshError> {
        create_dir_with_permission(self.artifact_dir(), &self.permission)?;
        self.write_cache_info()?;
        ensure_available(self.artifact_dir(), MIN_FREE_BYTES)
    }

    fn write_cache_info(&self) -> Result<(), RefreshError> {
        let modules = read_module_list(&self.config.paths.apex_info_list)?;
        let art = modules
            .iter()
            .find(|module| module.name == ART_MODULE)
            .ok_or_else(|| RefreshError::MissingModule {
                name: ART_MODULE.to_string(),
            })?;
        let classpath = &self.config.classpath;
        let checksums = &*self.checksums;
        let info = CacheInfo {
            art_module: ModuleInfo::from(art),
            modules: ModuleInfo::from_list(&modules),
            boot_classpath: Component::from_jars(&classpath.boot_classpath, checksums)?,
            dex2oat_boot_classpath: Component::from_jars(
                &self.config.boot_extension_compilable_jars(),
                checksums,
            )?,
            system_server: SystemServerComponent::from_jars(
                &classpath.system_server_classpath,
                &classpath.standalone_system_server_jars,
                checksums,
            )?,
        };
        info.save(self.artifact_dir())?;
        Ok(())
    }

    fn compile_boot_extension(
        &self,
        isa: InstructionSet,
        budget: &TimeBudget,
    ) -> Result<(), RefreshError> {
        let layout = self.layout();
        let Some(outputs) = layout.boot_extension(isa)? else {
            log::info!("no boot classpath jars to compile for {isa}");
            return Ok(());
        };
        create_dir_with_permission(&layout.isa_dir(isa), &self.permission)?;
        let primary = layout.primary_boot_image(isa);
        let unit = BootExtensionUnit {
            isa,
            dex_files: self.config.boot_extension_compilable_jars(),
            boot_classpath: self.config.classpath.dex2oat_boot_classpath.clone(),
            primary_boot_image: primary.is_file().then_some(primary),
            profile: Some(self.config.boot_profile()),
            compiler_filter: self.config.compile.boot_extension_compiler_filter,
            outputs,
            hints: ResourceHints::for_priority(PriorityClass::Boot, &self.config.properties),
            permission: self.permission,
        };
        let invocation = Dex2oatInvocation::boot_extension(&self.config.paths.dex2oat, &unit)?;
        self.execute(invocation, budget, &format!("boot image extension for {isa}"))
    }

    fn compile_system_server(
        &self,
        job: &SystemServerJob,
        budget: &TimeBudget,
    ) -> Result<(), RefreshError> {
        let isa = self.config.compile.system_server_isa;
        let layout = self.layout();
        let outputs = layout.system_server(&job.jar)?;
        create_dir_with_permission(&layout.isa_dir(isa), &self.permission)?;
        let unit = SystemServerUnit {
            isa,
            jar: job.jar.clone(),
            class_loader_context: class_loader_context(&job.context_jars),
            context_jars: job.context_jars.clone(),
            boot_classpath: self.config.classpath.boot_classpath.clone(),
            boot_images: self.boot_images(isa),
            profile: Some(prebuilt_profile_path(&job.jar)?),
            compiler_filter: self.system_server_filter(),
            outputs,
            generate_app_image: job.in_classpath,
            hints: ResourceHints::for_priority(PriorityClass::Boot, &self.config.properties),
            permission: self.permission,
        };
        let invocation = Dex2oatInvocation::system_server(&self.config.paths.dex2oat, &unit)?;
        self.execute(invocation, budget, &job.jar)
    }

    fn execute(
        &self,
        invocation: Dex2oatInvocation,
        budget: &TimeBudget,
        what: &str,
    ) -> Result<(), RefreshError> {
        let timeout = budget.child_timeout().ok_or(RefreshError::BudgetExhausted)?;
        if self.config.compile.dry_run {
            log::info!("dry run, not compiling {what}: {}", invocation.args().join(" "));
            return Ok(());
        }
        log::info!("compiling {what} (timeout {}s)", timeout.as_secs());
        let outcome = invocation.execute(Some(timeout), &self.token)?;
        if outcome.cancelled {
            return Err(RefreshError::Cancelled);
        }
        log::info!(
            "compiled {what} in {} ms, {} bytes",
            outcome.wall_time_ms,
            outcome.size_bytes
        );
        Ok(())
    }

    /// The boot images system server jars are compiled against: the
    /// primary image and the extension, when present.
    fn boot_images(&self, isa: InstructionSet) -> Vec<PathBuf> {
        let layout = self.layout();
        let mut images = Vec::new();
        let primary = layout.primary_boot_image(isa);
        if primary.is_file() {
            images.push(primary);
        }
        if let Ok(Some(extension)) = layout.boot_extension(isa) {
            if extension.image.is_file() {
                images.push(extension.image);
            }
        }
        images
    }

    fn system_server_filter(&self) -> CompilerFilter {
        self.config
            .compile
            .system_server_compiler_filter
            .unwrap_or(CompilerFilter::SpeedProfile)
    }

    /// Every system server jar in compilation order. Classpath jars see the
    /// jars before them; standalone jars see the whole classpath.
    fn system_server_jobs(&self) -> Vec<SystemServerJob> {
        let classpath = &self.config.classpath.system_server_classpath;
        let in_classpath = classpath.iter().enumerate().map(|(i, jar)| SystemServerJob {
            jar: jar.clone(),
            context_jars: classpath[..i].to_vec(),
            in_classpath: true,
        });
        let standalone = self
            .config
            .classpath
            .standalone_system_server_jars
            .iter()
            .map(|jar| SystemServerJob {
                jar: jar.clone(),
                context_jars: classpath.clone(),
                in_classpath: false,
            });
        in_classpath.chain(standalone).collect()
    }

    /// Asks the analyzer whether every artifact is usable. Unusable
    /// artifacts discard the whole artifact directory.
    pub fn verify(&self) -> ExitCode {
        let requests = match self.verification_requests() {
            Ok(requests) => requests,
            Err(e) => {
                log::warn!("cannot verify artifacts: {e}");
                return self.discard_artifacts();
            }
        };
        for (what, request) in &requests {
            match self.is_usable(request) {
                Ok(true) => log::debug!("{what} is usable"),
                Ok(false) => {
                    log::info!("{what} is not usable");
                    return self.discard_artifacts();
                }
                Err(e) => {
                    log::warn!("cannot verify {what}: {e}");
                    return self.discard_artifacts();
                }
            }
        }
        log::info!("verified {} artifacts", requests.len());
        ExitCode::Okay
    }

    fn discard_artifacts(&self) -> ExitCode {
        match remove_dir(self.artifact_dir()) {
            Ok(()) => ExitCode::CompilationRequired,
            Err(e) => {
                log::error!("cannot remove artifacts: {e}");
                ExitCode::CleanupFailed
            }
        }
    }

    fn verification_requests(&self) -> Result<Vec<(String, AnalyzerRequest)>, RefreshError> {
        let layout = self.layout();
        let boot_image_dir = self.config.boot_image_dir();
        let compilable = self.config.boot_extension_compilable_jars();
        let mut requests = Vec::new();

        for &isa in &self.config.compile.boot_extension_isas {
            let Some(paths) = layout.boot_extension(isa)? else {
                continue;
            };
            let filter = effective_filter(
                self.config.compile.boot_extension_compiler_filter,
                &self.config.boot_profile(),
            );
            requests.push((
                format!("boot image extension for {isa}"),
                AnalyzerRequest {
                    dex_files: compilable.clone(),
                    isa,
                    compiler_filter: filter,
                    artifact_dir: None,
                    oat_file: Some(paths.code),
                    class_loader_context: None,
                    boot_image_dir: boot_image_dir.clone(),
                    boot_classpath: self.config.classpath.dex2oat_boot_classpath.clone(),
                    downgrade: false,
                    profile_changed: false,
                },
            ));
        }

        let isa = self.config.compile.system_server_isa;
        for job in self.system_server_jobs() {
            let profile = prebuilt_profile_path(&job.jar)?;
            let request = AnalyzerRequest {
                dex_files: vec![job.jar.clone()],
                isa,
                compiler_filter: effective_filter(self.system_server_filter(), &profile),
                artifact_dir: Some(self.artifact_dir().to_path_buf()),
                oat_file: None,
                class_loader_context: Some(class_loader_context(&job.context_jars)),
                boot_image_dir: boot_image_dir.clone(),
                boot_classpath: self.config.classpath.boot_classpath.clone(),
                downgrade: false,
                profile_changed: false,
            };
            requests.push((job.jar, request));
        }
        Ok(requests)
    }

    fn is_usable(&self, request: &AnalyzerRequest) -> Result<bool, RefreshError> {
        let Some(analyzer) = &self.config.paths.analyzer else {
            let needed = analyze(request, &*self.checksums)?;
            return Ok(needed == DexOptNeeded::NoDexOptNeeded);
        };
        let args = request.to_args(analyzer);
        let timeout = Duration::from_secs(self.config.compile.max_child_process_seconds);
        let result =
            odr_exec::run_with_callbacks(&args, &ExecOptions::with_timeout(Some(timeout)), &self.token);
        match result.status {
            ExecStatus::Exited(code) if code == DexOptNeeded::NoDexOptNeeded.code() => Ok(true),
            ExecStatus::Exited(code) if code <= DexOptNeeded::ForFilter.code() => Ok(false),
            other => Err(RefreshError::Analyzer {
                reason: format!("{other:?}"),
            }),
        }
    }
}

/// The filter a compilation actually uses: profile-guided filters fall
/// back when the profile is missing.
fn effective_filter(filter: CompilerFilter, profile: &Path) -> CompilerFilter {
    if filter.depends_on_profile() && !profile.is_file() {
        filter.non_profile_equivalent()
    } else {
        filter
    }
}

fn refresh_mtimes(paths: &BTreeSet<PathBuf>) {
    let now = SystemTime::now();
    for path in paths {
        let touched = std::fs::File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(now));
        if let Err(e) = touched {
            log::warn!("cannot refresh {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odr_oat::{BootImageContext, OatHeader};
    use std::os::unix::fs::PermissionsExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let fx = Self {
                root: dir.path().to_path_buf(),
                _dir: dir,
            };
            let javalib = fx.root.join("apex/com.android.art/javalib");
            let framework = fx.root.join("system/framework");
            std::fs::create_dir_all(&javalib).unwrap();
            std::fs::create_dir_all(&framework).unwrap();
            std::fs::create_dir_all(fx.root.join("bin")).unwrap();
            std::fs::write(javalib.join("core-oj.jar"), b"core-oj dex").unwrap();
            for name in ["framework", "services", "wifi"] {
                std::fs::write(fx.jar(name), format!("{name} dex")).unwrap();
            }
            fx.write_modules(1);
            fx.write_compiler("");
            fx
        }

        fn core(&self) -> String {
            self.root
                .join("apex/com.android.art/javalib/core-oj.jar")
                .to_string_lossy()
                .into_owned()
        }

        fn jar(&self, name: &str) -> String {
            self.root
                .join("system/framework")
                .join(format!("{name}.jar"))
                .to_string_lossy()
                .into_owned()
        }

        fn artifact_dir(&self) -> PathBuf {
            self.root.join("dalvik-cache")
        }

        fn invocation_log(&self) -> PathBuf {
            self.root.join("invocations")
        }

        fn write_modules(&self, version: i64) {
            let list = format!(
                r#"[
  {{"name": "com.android.art", "version_code": {version}, "version_name": "{version}", "last_update_millis": 1000}},
  {{"name": "com.android.wifi", "version_code": 7}}
]"#
            );
            std::fs::write(self.root.join("apex-info-list.json"), list).unwrap();
        }

        fn write_script(&self, path: &Path, body: &str) {
            std::fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        /// Installs a compiler that logs its arguments, runs `pre`, then
        /// writes to every output descriptor.
        fn write_compiler(&self, pre: &str) {
            let body = format!(
                r#"echo "$*" >> "{log}"
{pre}
for arg in "$@"; do
  case "$arg" in
    --oat-fd=*|--output-vdex-fd=*|--image-fd=*|--app-image-fd=*)
      echo compiled > "/proc/self/fd/${{arg#*=}}" ;;
  esac
done
"#,
                log = self.invocation_log().display()
            );
            self.write_script(&self.root.join("bin/dex2oat"), &body);
        }

        fn invocations(&self) -> Vec<String> {
            std::fs::read_to_string(self.invocation_log())
                .map(|log| log.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }

        fn config(&self) -> RefreshConfig {
            let root = self.root.display();
            odr_config::load_config_from_str(&format!(
                r#"
[paths]
artifact_dir = "{root}/dalvik-cache"
dex2oat = "{root}/bin/dex2oat"
apex_info_list = "{root}/apex-info-list.json"
compilation_log = "{root}/compilation-log.json"
android_root = "{root}/system"
art_root = "{root}/apex/com.android.art"

[classpath]
boot_classpath = ["{core}", "{framework}"]
dex2oat_boot_classpath = ["{core}", "{framework}"]
system_server_classpath = ["{services}"]
standalone_system_server_jars = ["{wifi}"]

[compile]
boot_extension_isas = ["arm64"]
system_server_isa = "arm64"
min_child_process_seconds = 1
"#,
                core = self.core(),
                framework = self.jar("framework"),
                services = self.jar("services"),
                wifi = self.jar("wifi"),
            ))
            .unwrap()
        }

        fn refresh(&self) -> OnDeviceRefresh {
            OnDeviceRefresh::new(self.config())
        }

        fn boot_extension(&self) -> odr_paths::ArtifactPaths {
            let config = self.config();
            ArtifactLayout::new(&config)
                .boot_extension(InstructionSet::Arm64)
                .unwrap()
                .unwrap()
        }

        fn system_server(&self, name: &str) -> odr_paths::ArtifactPaths {
            let config = self.config();
            ArtifactLayout::new(&config)
                .system_server(&self.jar(name))
                .unwrap()
        }

        fn compile_all(&self) {
            let refresh = self.refresh();
            let result = refresh.check();
            assert_eq!(refresh.compile(&result.options), ExitCode::CompilationSuccess);
        }
    }

    #[test]
    fn first_run_requires_everything() {
        let fx = Fixture::new();
        let refresh = fx.refresh();
        let result = refresh.check();
        assert_eq!(result.exit_code, ExitCode::CompilationRequired);
        assert_eq!(result.options, CompilationOptions::all(refresh.config()));
        assert_eq!(result.trigger, Some(Trigger::MissingArtifacts));
        assert!(fx.invocations().is_empty());
    }

    #[test]
    fn compiled_artifacts_are_up_to_date() {
        let fx = Fixture::new();
        fx.compile_all();
        assert_eq!(fx.invocations().len(), 3);
        assert!(fx.boot_extension().iter().all(Path::is_file));
        assert!(fx.system_server("services").image.is_file());
        assert!(!fx.system_server("wifi").image.exists());
        assert!(CacheInfo::path(&fx.artifact_dir()).is_file());

        let result = fx.refresh().check();
        assert_eq!(result, CheckResult::up_to_date());
    }

    #[test]
    fn up_to_date_artifacts_spawn_nothing() {
        let fx = Fixture::new();
        fx.compile_all();
        std::fs::remove_file(fx.invocation_log()).unwrap();
        fx.write_compiler("exit 1");

        let refresh = fx.refresh();
        let result = refresh.check();
        assert_eq!(refresh.compile(&result.options), ExitCode::Okay);
        assert!(fx.invocations().is_empty());
    }

    #[test]
    fn check_is_idempotent() {
        let fx = Fixture::new();
        fx.compile_all();
        std::fs::write(fx.jar("services"), b"services dex v2").unwrap();

        let refresh = fx.refresh();
        let first = refresh.check();
        let second = refresh.check();
        assert_eq!(first, second);
        assert_eq!(first.exit_code, ExitCode::CompilationRequired);
        assert!(first.options.boot_isas.is_empty());
        assert_eq!(first.options.system_server_jars.len(), 2);
        assert_eq!(first.trigger, Some(Trigger::DexFilesChanged));

        assert!(fx.boot_extension().iter().all(Path::is_file));
        assert!(!fx.system_server("services").code.exists());
    }

    #[test]
    fn module_update_recompiles_both_tiers() {
        let fx = Fixture::new();
        fx.compile_all();
        fx.write_modules(2);

        let result = fx.refresh().check();
        assert_eq!(result.exit_code, ExitCode::CompilationRequired);
        assert!(result.options.boot_isas.contains(&InstructionSet::Arm64));
        assert_eq!(result.options.system_server_jars.len(), 2);
        assert_eq!(result.trigger, Some(Trigger::ApexVersionMismatch));
    }

    #[test]
    fn missing_artifact_marks_only_its_jar() {
        let fx = Fixture::new();
        fx.compile_all();
        std::fs::remove_file(fx.system_server("wifi").code).unwrap();
        let stray = fx.artifact_dir().join("arm64").join("stale.odex");
        std::fs::write(&stray, b"stale").unwrap();

        let result = fx.refresh().check();
        assert_eq!(result.exit_code, ExitCode::CompilationRequired);
        assert!(result.options.boot_isas.is_empty());
        assert_eq!(
            result.options.system_server_jars,
            BTreeSet::from([fx.jar("wifi")])
        );
        assert_eq!(result.trigger, Some(Trigger::MissingArtifacts));
        assert!(!stray.exists());
        assert!(!fx.system_server("wifi").metadata.exists());
        assert!(fx.system_server("services").code.is_file());
        assert!(CacheInfo::path(&fx.artifact_dir()).is_file());
    }

    #[test]
    fn corrupt_cache_info_discards_everything() {
        let fx = Fixture::new();
        fx.compile_all();
        std::fs::write(CacheInfo::path(&fx.artifact_dir()), b"{ not json").unwrap();

        let refresh = fx.refresh();
        let result = refresh.check();
        assert_eq!(result.exit_code, ExitCode::CompilationRequired);
        assert_eq!(result.options, CompilationOptions::all(refresh.config()));
        assert!(!fx.artifact_dir().exists());
    }

    #[test]
    fn unreadable_module_list_compiles_everything() {
        let fx = Fixture::new();
        fx.compile_all();
        std::fs::remove_file(fx.root.join("apex-info-list.json")).unwrap();

        let refresh = fx.refresh();
        let result = refresh.check();
        assert_eq!(result.exit_code, ExitCode::CompilationRequired);
        assert_eq!(result.options, CompilationOptions::all(refresh.config()));
        assert_eq!(result.trigger, Some(Trigger::Unknown));
    }

    #[test]
    fn without_partial_compilation_everything_is_recompiled() {
        let fx = Fixture::new();
        fx.compile_all();
        std::fs::remove_file(fx.system_server("wifi").code).unwrap();

        let mut config = fx.config();
        config.compile.partial_compilation = false;
        let refresh = OnDeviceRefresh::new(config);
        let result = refresh.check();
        assert_eq!(result.options, CompilationOptions::all(refresh.config()));
        assert!(!fx.artifact_dir().exists());
    }

    #[test]
    fn boot_extension_failure_aborts_run() {
        let fx = Fixture::new();
        fx.write_compiler("exit 1");
        let refresh = fx.refresh();
        let exit = refresh.compile(&CompilationOptions::all(refresh.config()));
        assert_eq!(exit, ExitCode::CompilationFailed);
        assert_eq!(fx.invocations().len(), 1);
        assert!(!fx.boot_extension().image.exists());
    }

    #[test]
    fn system_server_failure_continues_with_siblings() {
        let fx = Fixture::new();
        fx.write_compiler(&format!(
            r#"case "$*" in *--dex-file={}*) exit 1 ;; esac"#,
            fx.jar("services")
        ));
        let refresh = fx.refresh();
        let exit = refresh.compile(&CompilationOptions::all(refresh.config()));
        assert_eq!(exit, ExitCode::CompilationFailed);
        assert_eq!(fx.invocations().len(), 3);
        assert!(!fx.system_server("services").code.exists());
        assert!(fx.system_server("wifi").code.is_file());
    }

    #[test]
    fn class_loader_context_accumulates() {
        let fx = Fixture::new();
        fx.compile_all();
        let invocations = fx.invocations();
        let line_for = |name: &str| {
            let flag = format!("--dex-file={}", fx.jar(name));
            invocations
                .iter()
                .find(|line| line.split(' ').any(|arg| arg == flag))
                .cloned()
                .unwrap()
        };
        let services = line_for("services");
        assert!(services.contains("--class-loader-context=PCL[] "));
        assert!(services.contains("--app-image-fd="));
        let wifi = line_for("wifi");
        assert!(wifi.contains(&format!("--class-loader-context=PCL[{}]", fx.jar("services"))));
        assert!(!wifi.contains("--app-image-fd="));
        assert!(wifi.contains(&format!("--boot-image={}", fx.boot_extension().image.display())));
    }

    #[test]
    fn dry_run_spawns_nothing() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.compile.dry_run = true;
        let refresh = OnDeviceRefresh::new(config);
        let exit = refresh.compile(&CompilationOptions::all(refresh.config()));
        assert_eq!(exit, ExitCode::CompilationSuccess);
        assert!(fx.invocations().is_empty());
        assert!(!fx.boot_extension().image.exists());
    }

    #[test]
    fn exhausted_budget_fails_run() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.compile.max_execution_seconds = 0;
        let refresh = OnDeviceRefresh::new(config);
        let exit = refresh.compile(&CompilationOptions::all(refresh.config()));
        assert_eq!(exit, ExitCode::CompilationFailed);
        assert!(fx.invocations().is_empty());
    }

    #[test]
    fn cancelled_run_fails() {
        let fx = Fixture::new();
        let refresh = fx.refresh();
        refresh.cancellation_token().cancel();
        let exit = refresh.compile(&CompilationOptions::all(refresh.config()));
        assert_eq!(exit, ExitCode::CompilationFailed);
        assert!(!fx.boot_extension().image.exists());
    }

    #[test]
    fn force_compile_replaces_artifacts() {
        let fx = Fixture::new();
        fx.compile_all();
        let stray = fx.artifact_dir().join("arm64").join("stale.odex");
        std::fs::write(&stray, b"stale").unwrap();

        assert_eq!(fx.refresh().force_compile(), ExitCode::CompilationSuccess);
        assert!(!stray.exists());
        assert_eq!(fx.invocations().len(), 6);
        assert_eq!(fx.refresh().check(), CheckResult::up_to_date());
    }

    fn with_analyzer(fx: &Fixture, body: &str) -> OnDeviceRefresh {
        let analyzer = fx.root.join("bin/dexoptanalyzer");
        fx.write_script(
            &analyzer,
            &format!(
                "echo \"$*\" >> \"{}\"\n{body}\n",
                fx.root.join("analyses").display()
            ),
        );
        let mut config = fx.config();
        config.paths.analyzer = Some(analyzer);
        OnDeviceRefresh::new(config)
    }

    #[test]
    fn verify_accepts_usable_artifacts() {
        let fx = Fixture::new();
        fx.compile_all();
        let refresh = with_analyzer(&fx, "exit 0");
        assert_eq!(refresh.verify(), ExitCode::Okay);

        let analyses = std::fs::read_to_string(fx.root.join("analyses")).unwrap();
        let lines: Vec<&str> = analyses.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(&format!("--oat-file={}", fx.boot_extension().code.display())));
        assert!(lines[2].contains("--class-loader-context=PCL["));
        assert!(fx.artifact_dir().exists());
    }

    #[test]
    fn verify_discards_unusable_artifacts() {
        let fx = Fixture::new();
        fx.compile_all();
        let refresh = with_analyzer(&fx, "exit 1");
        assert_eq!(refresh.verify(), ExitCode::CompilationRequired);
        assert!(!fx.artifact_dir().exists());
    }

    #[test]
    fn verify_treats_analyzer_errors_as_unusable() {
        let fx = Fixture::new();
        fx.compile_all();
        let refresh = with_analyzer(&fx, "exit 101");
        assert_eq!(refresh.verify(), ExitCode::CompilationRequired);
    }

    #[test]
    fn verify_in_process_rejects_unreadable_artifacts() {
        let fx = Fixture::new();
        fx.compile_all();
        assert_eq!(fx.refresh().verify(), ExitCode::CompilationRequired);
        assert!(!fx.artifact_dir().exists());
    }

    #[test]
    fn verify_in_process_accepts_matching_headers() {
        let fx = Fixture::new();
        let config = fx.config();
        let boot = BootImageContext::fetch(
            &[InstructionSet::Arm64],
            &config.classpath.boot_classpath,
            &config.boot_image_dir(),
            &ContentChecksums,
        )
        .unwrap();
        let boot_checksums = boot.get(InstructionSet::Arm64).unwrap().dex_checksums.clone();

        let write = |paths: &odr_paths::ArtifactPaths, jar: &str, context: Option<String>| {
            let dex = ContentChecksums.dex_file_info(Path::new(jar)).unwrap();
            let header = OatHeader {
                boot_class_path_checksums: boot_checksums.clone(),
                class_loader_context: context,
                has_dex_code: true,
                ..OatHeader::new(CompilerFilter::Speed, dex.checksums)
            };
            std::fs::create_dir_all(paths.code.parent().unwrap()).unwrap();
            let mut bytes = Vec::new();
            header.write_to(&mut bytes).unwrap();
            std::fs::write(&paths.code, bytes).unwrap();
            std::fs::write(&paths.metadata, b"vdex").unwrap();
        };
        write(&fx.boot_extension(), &fx.jar("framework"), None);
        write(
            &fx.system_server("services"),
            &fx.jar("services"),
            Some("PCL[]".to_string()),
        );
        write(
            &fx.system_server("wifi"),
            &fx.jar("wifi"),
            Some(format!("PCL[{}]", fx.jar("services"))),
        );

        assert_eq!(OnDeviceRefresh::new(config).verify(), ExitCode::Okay);
    }

    #[test]
    fn missing_profile_falls_back_to_non_profile_filter() {
        let fx = Fixture::new();
        let profile = fx.root.join("boot-image.prof");
        assert_eq!(
            effective_filter(CompilerFilter::SpeedProfile, &profile),
            CompilerFilter::Speed
        );
        std::fs::write(&profile, b"profile").unwrap();
        assert_eq!(
            effective_filter(CompilerFilter::SpeedProfile, &profile),
            CompilerFilter::SpeedProfile
        );
        assert_eq!(
            effective_filter(CompilerFilter::Verify, &profile),
            CompilerFilter::Verify
        );
    }
}
