//! Artifact staleness decisions.
//!
//! Given a source archive and an instruction set, [`OatFileAssistant`]
//! ranks the candidate artifacts that could serve it, derives an
//! [`OatStatus`] for the one it picks, and answers whether (and why) the
//! archive should be recompiled for a target [`CompilerFilter`] under a
//! [`DexOptTrigger`].
//!
//! The artifact format and the bytecode checksum algorithm are supplied from
//! outside through [`ArtifactLoader`] and [`DexChecksumSource`].
//!
//! [`CompilerFilter`]: odr_common::CompilerFilter

#![warn(missing_docs)]

pub mod assistant;
pub mod boot;
pub mod candidate;
pub mod checksum;
pub mod error;
pub mod header;
pub mod trigger;

pub use assistant::{AssistantOptions, DexOptNeeded, OatFileAssistant, OptimizationStatus};
pub use boot::{BootImageContext, BootImageInfo};
pub use candidate::{Candidate, CandidateKind, Location, OatStatus, StatusInputs};
pub use checksum::{format_checksums, ContentChecksums, DexChecksumSource, DexFileInfo};
pub use error::OatError;
pub use header::{ArtifactLoader, HeaderLoader, OatHeader};
pub use trigger::DexOptTrigger;
