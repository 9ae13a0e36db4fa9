//! Candidate artifacts and their derived status.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use odr_common::InstructionSet;

use crate::boot::BootImageContext;
use crate::checksum::DexFileInfo;
use crate::header::{ArtifactLoader, OatHeader};

/// The places a usable artifact for a source may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    /// Code artifact beside the source.
    Odex,
    /// Code artifact in the dalvik cache or side cache.
    Oat,
    /// Metadata artifact companion to the odex location.
    VdexForOdex,
    /// Metadata artifact companion to the oat location.
    VdexForOat,
    /// Shipped metadata bundle, evaluated for the odex location.
    DmForOdex,
    /// Shipped metadata bundle, evaluated for the oat location.
    DmForOat,
}

impl CandidateKind {
    /// Returns `true` for candidates that carry no compiled code.
    pub fn is_metadata_only(&self) -> bool {
        !matches!(self, Self::Odex | Self::Oat)
    }

    /// The location reported for this kind.
    pub fn location(&self) -> Location {
        match self {
            Self::Odex | Self::VdexForOdex => Location::Odex,
            Self::Oat | Self::VdexForOat => Location::Oat,
            Self::DmForOdex | Self::DmForOat => Location::Dm,
        }
    }
}

/// Where the artifact reported by an optimization status was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A shipped metadata bundle.
    Dm,
    /// The dalvik cache or side cache.
    Oat,
    /// Beside the source.
    Odex,
    /// Nothing could be opened.
    NoneOrError,
}

impl Location {
    /// Lowercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dm => "dm",
            Self::Oat => "oat",
            Self::Odex => "odex",
            Self::NoneOrError => "none",
        }
    }
}

/// How an artifact relates to its inputs. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OatStatus {
    /// The artifact (or its companion metadata) could not be loaded.
    CannotOpen,
    /// The artifact was built from different dex files.
    DexOutOfDate,
    /// The artifact was built against a different boot classpath.
    BootImageOutOfDate,
    /// The artifact was built in a different class loader context.
    ContextOutOfDate,
    /// The artifact can be used as is.
    UpToDate,
}

impl OatStatus {
    /// Human-readable reason used in logs and analyzer output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CannotOpen => "io-error-no-oat",
            Self::DexOutOfDate => "dex-out-of-date",
            Self::BootImageOutOfDate => "boot-image-out-of-date",
            Self::ContextOutOfDate => "context-out-of-date",
            Self::UpToDate => "up-to-date",
        }
    }
}

/// Everything a candidate's status depends on besides the artifact itself.
pub struct StatusInputs<'a> {
    /// Instruction set of the artifact.
    pub isa: InstructionSet,
    /// The source archive, or `None` if it could not be read.
    pub dex: Option<&'a DexFileInfo>,
    /// Boot classpath state for the run.
    pub boot: &'a BootImageContext,
    /// The requested class loader context, if any.
    pub class_loader_context: Option<&'a str>,
    /// How to open artifacts.
    pub loader: &'a dyn ArtifactLoader,
}

/// One candidate location with lazily loaded header and memoized status.
#[derive(Debug)]
pub struct Candidate {
    kind: CandidateKind,
    path: PathBuf,
    vdex: Option<PathBuf>,
    header: OnceCell<Option<OatHeader>>,
    status: OnceCell<OatStatus>,
}

impl Candidate {
    /// Creates a candidate at `path`. Code candidates pass the metadata
    /// file that must accompany them as `vdex`.
    pub fn new(kind: CandidateKind, path: PathBuf, vdex: Option<PathBuf>) -> Self {
        Self {
            kind,
            path,
            vdex,
            header: OnceCell::new(),
            status: OnceCell::new(),
        }
    }

    /// The candidate kind.
    pub fn kind(&self) -> CandidateKind {
        self.kind
    }

    /// The artifact path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the header once. Load failures are cached as `None`.
    pub fn header(&self, loader: &dyn ArtifactLoader) -> Option<&OatHeader> {
        self.header
            .get_or_init(|| match loader.load(&self.path) {
                Ok(header) => Some(header),
                Err(e) => {
                    log::debug!("cannot open {}: {e}", self.path.display());
                    None
                }
            })
            .as_ref()
    }

    /// The status of this candidate, computed on first use.
    pub fn status(&self, inputs: &StatusInputs<'_>) -> OatStatus {
        *self.status.get_or_init(|| self.compute_status(inputs))
    }

    /// Returns `true` if the artifact can be used without recompiling.
    pub fn is_usable(&self, inputs: &StatusInputs<'_>) -> bool {
        self.status(inputs) == OatStatus::UpToDate
    }

    /// Hands over the loaded header and forgets the memoized state.
    pub fn release(&mut self) -> Option<OatHeader> {
        self.status.take();
        self.header.take().flatten()
    }

    fn compute_status(&self, inputs: &StatusInputs<'_>) -> OatStatus {
        let Some(header) = self.header(inputs.loader) else {
            return OatStatus::CannotOpen;
        };
        if let Some(vdex) = &self.vdex {
            if !vdex.is_file() {
                log::debug!("{} has no {}", self.path.display(), vdex.display());
                return OatStatus::CannotOpen;
            }
        }

        match inputs.dex {
            None => return OatStatus::DexOutOfDate,
            // A source without dex code relies on the copy inside the artifact.
            Some(dex) if dex.has_dex_code() && dex.checksums != header.dex_checksums => {
                return OatStatus::DexOutOfDate;
            }
            Some(_) => {}
        }

        let filter = header.compiler_filter;
        if !self.kind.is_metadata_only()
            && filter.depends_on_image_checksum()
            && !inputs
                .boot
                .matches(inputs.isa, &header.boot_class_path_checksums)
        {
            return OatStatus::BootImageOutOfDate;
        }

        if let Some(context) = inputs.class_loader_context {
            if !self.kind.is_metadata_only()
                && filter.is_verification_enabled()
                && header.class_loader_context.as_deref() != Some(context)
            {
                return OatStatus::ContextOutOfDate;
            }
        }

        OatStatus::UpToDate
    }
}
