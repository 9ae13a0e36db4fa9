//! Compiling a single source archive on request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use odr_common::{CompilerFilter, InstructionSet};
use odr_paths::{validate_absolute_normal_path, validate_dex_path, ArtifactPaths};
use odr_publish::FsPermission;

use crate::cancel::CancellationToken;
use crate::error::DexoptError;
use crate::invocation::Dex2oatInvocation;
use crate::priority::{PriorityClass, ResourceHints, SystemProperties};

/// Everything needed to compile one source archive.
#[derive(Debug, Clone)]
pub struct DexoptRequest {
    /// The source archive.
    pub dex_path: String,
    /// Target instruction set.
    pub isa: InstructionSet,
    /// Class loader context. `None` skips context checks in the compiler.
    pub class_loader_context: Option<String>,
    /// Jars named by the context, passed as descriptors.
    pub class_loader_context_jars: Vec<String>,
    /// Requested filter.
    pub compiler_filter: CompilerFilter,
    /// Why the compilation happens, recorded in the artifact.
    pub compilation_reason: String,
    /// Profile to compile with.
    pub profile: Option<PathBuf>,
    /// A previous metadata file the compiler may reuse.
    pub input_vdex: Option<PathBuf>,
    /// A shipped metadata bundle.
    pub dm: Option<PathBuf>,
    /// Where the code artifact goes. The metadata and image paths derive
    /// from it.
    pub output_oat: PathBuf,
    /// Produce an app image.
    pub generate_app_image: bool,
    /// Urgency, which selects resource hints.
    pub priority: PriorityClass,
    /// Free-form comments embedded in the artifact.
    pub comments: Option<String>,
    /// Kill the compiler after this long.
    pub timeout: Option<Duration>,
    /// Permission of the published files.
    pub permission: FsPermission,
}

/// What a dexopt run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DexoptResult {
    /// The run was cancelled and nothing was published.
    pub cancelled: bool,
    /// Wall time of the compiler.
    pub wall_time_ms: u64,
    /// CPU time of the compiler.
    pub cpu_time_ms: u64,
    /// Size of the new artifacts.
    pub size_bytes: u64,
    /// Size of the artifacts they replaced.
    pub size_before_bytes: u64,
    /// The published files.
    pub artifacts: Vec<PathBuf>,
}

/// Compiles source archives with the ahead-of-time compiler.
pub struct Dexopter {
    dex2oat: PathBuf,
    properties: Box<dyn SystemProperties + Send + Sync>,
}

impl Dexopter {
    /// Creates a dexopter running `dex2oat` with hints from `properties`.
    pub fn new(
        dex2oat: impl Into<PathBuf>,
        properties: Box<dyn SystemProperties + Send + Sync>,
    ) -> Self {
        Self {
            dex2oat: dex2oat.into(),
            properties,
        }
    }

    /// Builds the invocation for `request` without running it.
    pub fn invocation(&self, request: &DexoptRequest) -> Result<Dex2oatInvocation, DexoptError> {
        validate_dex_path(&request.dex_path)?;
        validate_absolute_normal_path(&request.output_oat.to_string_lossy())?;
        for jar in &request.class_loader_context_jars {
            validate_absolute_normal_path(jar)?;
        }
        let outputs = ArtifactPaths::from_oat_path(&request.output_oat);

        let mut inv = Dex2oatInvocation::new(&self.dex2oat);
        let dex_path = Path::new(&request.dex_path);
        let zip_fd = inv.add_input(dex_path)?;
        inv.args_mut()
            .add(format!("--zip-fd={zip_fd}"))
            .add(format!("--zip-location={}", request.dex_path));

        let oat_fd = inv.add_output(&outputs.code, &request.permission)?;
        let vdex_fd = inv.add_output(&outputs.metadata, &request.permission)?;
        inv.args_mut()
            .add(format!("--oat-fd={oat_fd}"))
            .add(format!("--oat-location={}", outputs.code.display()))
            .add(format!("--output-vdex-fd={vdex_fd}"));
        if request.generate_app_image {
            let image_fd = inv.add_output(&outputs.image, &request.permission)?;
            inv.args_mut().add(format!("--app-image-fd={image_fd}"));
        } else {
            inv.remove_on_success(outputs.image.clone());
        }

        if let Some(context) = &request.class_loader_context {
            let mut fds = Vec::with_capacity(request.class_loader_context_jars.len());
            for jar in &request.class_loader_context_jars {
                fds.push(inv.add_input(Path::new(jar))?.to_string());
            }
            let classpath_dir = dex_path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            inv.args_mut()
                .add(format!("--class-loader-context={context}"))
                .add_if_non_empty("--class-loader-context-fds=", &fds.join(":"))
                .add_if_non_empty("--classpath-dir=", &classpath_dir);
        }

        if let Some(vdex) = &request.input_vdex {
            if let Some(fd) = inv.add_optional_input(vdex)? {
                inv.args_mut().add(format!("--input-vdex-fd={fd}"));
            }
        }
        if let Some(dm) = &request.dm {
            if let Some(fd) = inv.add_optional_input(dm)? {
                inv.args_mut().add(format!("--dm-fd={fd}"));
            }
        }
        if let Some(profile) = &request.profile {
            let fd = inv.add_input(profile)?;
            inv.args_mut().add(format!("--profile-file-fd={fd}"));
        }

        let hints = ResourceHints::for_priority(request.priority, &*self.properties);
        let args = inv.args_mut();
        args.add(format!("--instruction-set={}", request.isa))
            .add(format!("--compiler-filter={}", request.compiler_filter))
            .add(format!(
                "--compilation-reason={}",
                request.compilation_reason
            ))
            .add_if(
                request.priority >= PriorityClass::Interactive,
                "--compact-dex-level=none",
            );
        hints.add_to(args);
        args.add("--avoid-storing-invocation");
        if let Some(comments) = &request.comments {
            args.add(format!("--comments={comments}"));
        }
        Ok(inv)
    }

    /// Compiles `request`, publishing the outputs only if the compiler
    /// succeeds. Killing every child through `token` yields a cancelled
    /// result.
    pub fn dexopt(
        &self,
        request: &DexoptRequest,
        token: &CancellationToken,
    ) -> Result<DexoptResult, DexoptError> {
        let outputs = ArtifactPaths::from_oat_path(&request.output_oat);
        let size_before_bytes = outputs
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();

        let invocation = self.invocation(request)?;
        log::info!(
            "compiling {} for {} with {}",
            request.dex_path,
            request.isa,
            request.compiler_filter
        );
        let outcome = invocation.execute(request.timeout, token)?;
        Ok(DexoptResult {
            cancelled: outcome.cancelled,
            wall_time_ms: outcome.wall_time_ms,
            cpu_time_ms: outcome.cpu_time_ms,
            size_bytes: outcome.size_bytes,
            size_before_bytes,
            artifacts: outcome.artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::tests::FAKE_COMPILER;
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;

    struct Setup {
        dir: tempfile::TempDir,
        dex: String,
        oat: PathBuf,
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let dex = dir.path().join("app").join("base.apk");
        std::fs::create_dir_all(dex.parent().unwrap()).unwrap();
        std::fs::write(&dex, b"dex").unwrap();
        let oat = dir.path().join("app/oat/arm64/base.odex");
        std::fs::create_dir_all(oat.parent().unwrap()).unwrap();
        Setup {
            dex: dex.to_string_lossy().into_owned(),
            oat,
            dir,
        }
    }

    fn request(s: &Setup) -> DexoptRequest {
        DexoptRequest {
            dex_path: s.dex.clone(),
            isa: InstructionSet::Arm64,
            class_loader_context: Some("PCL[]".to_string()),
            class_loader_context_jars: Vec::new(),
            compiler_filter: CompilerFilter::Speed,
            compilation_reason: "install".to_string(),
            profile: None,
            input_vdex: None,
            dm: None,
            output_oat: s.oat.clone(),
            generate_app_image: false,
            priority: PriorityClass::Interactive,
            comments: None,
            timeout: Some(Duration::from_secs(30)),
            permission: FsPermission::world_readable(),
        }
    }

    fn dexopter(dex2oat: &Path, threads: Option<&str>) -> Dexopter {
        let mut props = BTreeMap::new();
        if let Some(threads) = threads {
            props.insert("dalvik.vm.dex2oat-threads".to_string(), threads.to_string());
        }
        Dexopter::new(dex2oat, Box::new(props))
    }

    fn write_compiler(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("dex2oat");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn arguments_follow_request() {
        let s = setup();
        let dm = s.dir.path().join("app/base.dm");
        std::fs::write(&dm, b"dm").unwrap();
        let mut req = request(&s);
        req.dm = Some(dm);
        req.input_vdex = Some(s.dir.path().join("absent.vdex"));

        let inv = dexopter(Path::new("/bin/dex2oat"), Some("4"))
            .invocation(&req)
            .unwrap();
        let args = inv.args();
        let has = |flag: &str| args.iter().any(|a| a.starts_with(flag));
        assert!(has("--zip-fd="));
        assert!(args.contains(&format!("--zip-location={}", s.dex)));
        assert!(args.contains(&"--class-loader-context=PCL[]".to_string()));
        assert!(has("--classpath-dir="));
        assert!(has("--dm-fd="));
        assert!(!has("--input-vdex-fd="));
        assert!(!has("--app-image-fd="));
        assert!(args.contains(&"--compact-dex-level=none".to_string()));
        assert!(args.contains(&"--compilation-reason=install".to_string()));
        assert!(args.contains(&"-j4".to_string()));
        assert!(args.contains(&"--avoid-storing-invocation".to_string()));
        assert!(!has("--comments="));
    }

    #[test]
    fn comments_are_added_beside_invocation_suppression() {
        let s = setup();
        let mut req = request(&s);
        req.priority = PriorityClass::Background;
        req.comments = Some("app-version:1".to_string());
        let inv = dexopter(Path::new("/bin/dex2oat"), None)
            .invocation(&req)
            .unwrap();
        let args = inv.args();
        assert!(!args.contains(&"--compact-dex-level=none".to_string()));
        assert!(args.contains(&"--comments=app-version:1".to_string()));
        assert!(args.contains(&"--avoid-storing-invocation".to_string()));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let s = setup();
        let mut req = request(&s);
        req.dex_path = "relative.apk".to_string();
        assert!(matches!(
            dexopter(Path::new("/bin/dex2oat"), None).invocation(&req),
            Err(DexoptError::Path(_))
        ));
        let mut req = request(&s);
        req.dex_path = format!("{}.txt", s.dex);
        assert!(matches!(
            dexopter(Path::new("/bin/dex2oat"), None).invocation(&req),
            Err(DexoptError::Path(_))
        ));
    }

    #[test]
    fn dexopt_publishes_and_reports_sizes() {
        let s = setup();
        std::fs::write(&s.oat, b"old odex").unwrap();
        let stale_image = s.oat.with_extension("art");
        std::fs::write(&stale_image, b"old art").unwrap();
        let compiler = write_compiler(s.dir.path(), FAKE_COMPILER);

        let result = dexopter(&compiler, None)
            .dexopt(&request(&s), &CancellationToken::new())
            .unwrap();
        assert!(!result.cancelled);
        assert_eq!(result.size_before_bytes, 15);
        assert!(result.size_bytes > 0);
        assert_eq!(
            result.artifacts,
            vec![s.oat.clone(), s.oat.with_extension("vdex")]
        );
        assert!(std::fs::read_to_string(&s.oat)
            .unwrap()
            .starts_with("compiled"));
        assert!(!stale_image.exists());
    }

    #[test]
    fn dexopt_failure_keeps_old_artifacts() {
        let s = setup();
        std::fs::write(&s.oat, b"old odex").unwrap();
        let compiler = write_compiler(s.dir.path(), "exit 1\n");

        let err = dexopter(&compiler, None)
            .dexopt(&request(&s), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, DexoptError::Failed { code: 1 }));
        assert_eq!(std::fs::read(&s.oat).unwrap(), b"old odex");
        let leftovers: Vec<_> = std::fs::read_dir(s.oat.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("base.odex")]);
    }

    #[test]
    fn dexopt_cancelled_publishes_nothing() {
        let s = setup();
        let compiler = write_compiler(s.dir.path(), "sleep 30\n");
        let token = CancellationToken::new();
        token.cancel();
        let result = dexopter(&compiler, None).dexopt(&request(&s), &token).unwrap();
        assert!(result.cancelled);
        assert!(!s.oat.exists());
    }
}
