//! Picks the best artifact for a source and decides whether to recompile.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use odr_common::{CompilerFilter, InstructionSet};
use odr_paths::{
    dm_path, oat_path_to_vdex_path, odex_filename, side_cache_oat_path, validate_dex_path,
};

use crate::boot::BootImageContext;
use crate::candidate::{Candidate, CandidateKind, Location, OatStatus, StatusInputs};
use crate::checksum::{DexChecksumSource, DexFileInfo};
use crate::error::OatError;
use crate::header::ArtifactLoader;
use crate::trigger::DexOptTrigger;

/// Default root of the dalvik cache.
const DEFAULT_DALVIK_CACHE_ROOT: &str = "/data";

/// Default side cache populated by on-device refresh.
const DEFAULT_SIDE_CACHE_DIR: &str = "/data/misc/apexdata/com.android.art/dalvik-cache";

/// What kind of compilation a source needs. The discriminants are the
/// analyzer's exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DexOptNeeded {
    /// The current artifact is fine for the request.
    NoDexOptNeeded = 0,
    /// Compile from the source.
    FromScratch = 1,
    /// Recompile against the current boot image.
    ForBootImage = 2,
    /// Recompile the usable artifact to reach the target filter.
    ForFilter = 3,
}

impl DexOptNeeded {
    /// The numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Summary of the artifact that would be used for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationStatus {
    /// Where the artifact lives.
    pub location: Location,
    /// Filter the artifact was compiled with, if it could be opened.
    pub compiler_filter: Option<CompilerFilter>,
    /// Status of the artifact.
    pub status: OatStatus,
}

/// Where to look for artifacts.
#[derive(Debug, Clone)]
pub struct AssistantOptions {
    /// Overrides the writability probe of the source's directory.
    pub dex_parent_writable: Option<bool>,
    /// Ignore artifacts in the side cache.
    pub deny_side_cache: bool,
    /// Root under which `dalvik-cache/<isa>` lives.
    pub dalvik_cache_root: PathBuf,
    /// Side cache directory checked before the dalvik cache.
    pub side_cache_dir: PathBuf,
    /// Explicit code artifact location, replacing the side cache and
    /// dalvik cache lookup.
    pub oat_location: Option<PathBuf>,
}

impl Default for AssistantOptions {
    fn default() -> Self {
        Self {
            dex_parent_writable: None,
            deny_side_cache: false,
            dalvik_cache_root: PathBuf::from(DEFAULT_DALVIK_CACHE_ROOT),
            side_cache_dir: PathBuf::from(DEFAULT_SIDE_CACHE_DIR),
            oat_location: None,
        }
    }
}

/// Staleness decisions for one source archive and instruction set.
///
/// Candidate statuses are memoized for the lifetime of the assistant, so an
/// assistant should not outlive the state it inspected.
pub struct OatFileAssistant<'a> {
    isa: InstructionSet,
    class_loader_context: Option<String>,
    boot: &'a BootImageContext,
    loader: &'a dyn ArtifactLoader,
    dex: Option<DexFileInfo>,
    dex_parent_writable: bool,
    odex: Candidate,
    oat: Candidate,
    vdex_for_odex: Candidate,
    vdex_for_oat: Candidate,
    dm_for_odex: Candidate,
    dm_for_oat: Candidate,
}

impl<'a> OatFileAssistant<'a> {
    /// Creates an assistant for `dex_location` compiled for `isa`.
    ///
    /// Fails only if `dex_location` is not a valid source path. An
    /// unreadable source is recorded and makes every candidate out of date.
    pub fn new(
        dex_location: &str,
        isa: InstructionSet,
        class_loader_context: Option<&str>,
        boot: &'a BootImageContext,
        checksums: &dyn DexChecksumSource,
        loader: &'a dyn ArtifactLoader,
        options: AssistantOptions,
    ) -> Result<Self, OatError> {
        validate_dex_path(dex_location)?;

        let odex_path = odex_filename(dex_location, isa)?;
        let oat_path = match options.oat_location {
            Some(path) => path,
            None => side_cache_oat_path(
                dex_location,
                isa,
                &options.dalvik_cache_root,
                &options.side_cache_dir,
                options.deny_side_cache,
            )?,
        };
        let odex_vdex = oat_path_to_vdex_path(&odex_path);
        let oat_vdex = oat_path_to_vdex_path(&oat_path);
        let dm = dm_path(dex_location)?;

        let dex = match checksums.dex_file_info(Path::new(dex_location)) {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("cannot read checksums of {dex_location}: {e}");
                None
            }
        };
        let dex_parent_writable = options
            .dex_parent_writable
            .unwrap_or_else(|| parent_writable(dex_location));

        Ok(Self {
            isa,
            class_loader_context: class_loader_context.map(str::to_string),
            boot,
            loader,
            dex,
            dex_parent_writable,
            odex: Candidate::new(CandidateKind::Odex, odex_path, Some(odex_vdex.clone())),
            oat: Candidate::new(CandidateKind::Oat, oat_path, Some(oat_vdex.clone())),
            vdex_for_odex: Candidate::new(CandidateKind::VdexForOdex, odex_vdex, None),
            vdex_for_oat: Candidate::new(CandidateKind::VdexForOat, oat_vdex, None),
            dm_for_odex: Candidate::new(CandidateKind::DmForOdex, dm.clone(), None),
            dm_for_oat: Candidate::new(CandidateKind::DmForOat, dm, None),
        })
    }

    /// Returns the candidate of `kind`.
    pub fn candidate(&self, kind: CandidateKind) -> &Candidate {
        match kind {
            CandidateKind::Odex => &self.odex,
            CandidateKind::Oat => &self.oat,
            CandidateKind::VdexForOdex => &self.vdex_for_odex,
            CandidateKind::VdexForOat => &self.vdex_for_oat,
            CandidateKind::DmForOdex => &self.dm_for_odex,
            CandidateKind::DmForOat => &self.dm_for_oat,
        }
    }

    /// Returns `true` if the source archive contains dex code.
    pub fn has_dex_code(&self) -> bool {
        self.dex.as_ref().is_some_and(DexFileInfo::has_dex_code)
    }

    fn inputs(&self) -> StatusInputs<'_> {
        StatusInputs {
            isa: self.isa,
            dex: self.dex.as_ref(),
            boot: self.boot,
            class_loader_context: self.class_loader_context.as_deref(),
            loader: self.loader,
        }
    }

    /// The status of a single candidate.
    pub fn status(&self, kind: CandidateKind) -> OatStatus {
        self.candidate(kind).status(&self.inputs())
    }

    /// Picks the candidate the runtime would use.
    pub fn best_candidate(&self) -> &Candidate {
        let inputs = self.inputs();
        let order: &[CandidateKind] = if self.dex_parent_writable {
            &[
                CandidateKind::Odex,
                CandidateKind::VdexForOdex,
                CandidateKind::DmForOdex,
            ]
        } else {
            &[
                CandidateKind::Oat,
                CandidateKind::Odex,
                CandidateKind::VdexForOat,
                CandidateKind::VdexForOdex,
                CandidateKind::DmForOat,
                CandidateKind::DmForOdex,
            ]
        };
        if let Some(&kind) = order
            .iter()
            .find(|&&kind| self.candidate(kind).is_usable(&inputs))
        {
            return self.candidate(kind);
        }
        if self.dex_parent_writable || self.odex.status(&inputs) != OatStatus::CannotOpen {
            &self.odex
        } else {
            &self.oat
        }
    }

    /// Decides whether the best candidate needs recompiling for `target`.
    pub fn dexopt_needed(&self, target: CompilerFilter, trigger: DexOptTrigger) -> DexOptNeeded {
        let inputs = self.inputs();
        let best = self.best_candidate();
        if best.is_usable(&inputs) {
            return if self.should_recompile_for_filter(best, target, trigger) {
                DexOptNeeded::ForFilter
            } else {
                DexOptNeeded::NoDexOptNeeded
            };
        }
        if !trigger.target_filter_is_better {
            return DexOptNeeded::NoDexOptNeeded;
        }
        if best.status(&inputs) == OatStatus::BootImageOutOfDate {
            return DexOptNeeded::ForBootImage;
        }
        if self.has_dex_code() {
            DexOptNeeded::FromScratch
        } else {
            DexOptNeeded::NoDexOptNeeded
        }
    }

    fn should_recompile_for_filter(
        &self,
        candidate: &Candidate,
        target: CompilerFilter,
        trigger: DexOptTrigger,
    ) -> bool {
        let Some(header) = candidate.header(self.loader) else {
            return false;
        };
        let current = header.compiler_filter;

        if trigger.target_filter_is_better && target.is_better(current) {
            return true;
        }
        if trigger.target_filter_is_same && current == target {
            return true;
        }
        if trigger.target_filter_is_worse && current.is_better(target) {
            return true;
        }
        if trigger.primary_boot_image_becomes_usable
            && current.depends_on_image_checksum()
            && !header.boot_class_path_checksums.starts_with('i')
            && self.boot.primary_boot_image_usable(self.isa)
        {
            return true;
        }
        if trigger.need_extraction
            && !header.has_dex_code
            && !self.dex.as_ref().is_some_and(|dex| dex.uncompressed)
        {
            return true;
        }
        false
    }

    /// Reports the artifact the runtime would use and its state.
    pub fn optimization_status(&self) -> OptimizationStatus {
        let inputs = self.inputs();
        let best = self.best_candidate();
        let status = best.status(&inputs);
        match best.header(self.loader) {
            Some(header) => OptimizationStatus {
                location: best.kind().location(),
                compiler_filter: Some(header.compiler_filter),
                status,
            },
            None => OptimizationStatus {
                location: Location::NoneOrError,
                compiler_filter: None,
                status,
            },
        }
    }
}

/// Probes whether the directory containing `dex_location` is writable by
/// this process.
fn parent_writable(dex_location: &str) -> bool {
    let Some(parent) = Path::new(dex_location).parent() else {
        return false;
    };
    let Ok(c_path) = CString::new(parent.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}
