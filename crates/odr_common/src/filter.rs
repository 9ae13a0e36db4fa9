//! Compiler filters and their ordering.
//!
//! A filter selects how much ahead-of-time work the compiler does. Filters are
//! totally ordered from "trust the bytecode" up to "compile everything", which
//! is what the staleness engine compares when deciding whether an existing
//! artifact is good enough.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ahead-of-time optimization filter.
///
/// The derived ordering is the optimization ordering: a later variant is
/// strictly better than an earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerFilter {
    /// Skip verification and trust the bytecode.
    AssumeVerified,
    /// Unpack dex code without verifying it.
    Extract,
    /// Verify bytecode but compile nothing.
    Verify,
    /// Profile-guided compilation optimized for size.
    SpaceProfile,
    /// Compile everything optimized for size.
    Space,
    /// Profile-guided compilation optimized for speed.
    SpeedProfile,
    /// Compile everything optimized for speed.
    Speed,
    /// Profile-guided compilation of everything.
    EverythingProfile,
    /// Compile absolutely everything.
    Everything,
}

impl CompilerFilter {
    /// All filters in ascending order.
    pub const ALL: [CompilerFilter; 9] = [
        CompilerFilter::AssumeVerified,
        CompilerFilter::Extract,
        CompilerFilter::Verify,
        CompilerFilter::SpaceProfile,
        CompilerFilter::Space,
        CompilerFilter::SpeedProfile,
        CompilerFilter::Speed,
        CompilerFilter::EverythingProfile,
        CompilerFilter::Everything,
    ];

    /// Returns the flag spelling of this filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFilter::AssumeVerified => "assume-verified",
            CompilerFilter::Extract => "extract",
            CompilerFilter::Verify => "verify",
            CompilerFilter::SpaceProfile => "space-profile",
            CompilerFilter::Space => "space",
            CompilerFilter::SpeedProfile => "speed-profile",
            CompilerFilter::Speed => "speed",
            CompilerFilter::EverythingProfile => "everything-profile",
            CompilerFilter::Everything => "everything",
        }
    }

    /// Returns `true` if `self` produces strictly more optimized code than `other`.
    pub fn is_better(&self, other: CompilerFilter) -> bool {
        *self > other
    }

    /// Returns `true` if the filter compiles native code ahead of time.
    pub fn is_aot_compilation_enabled(&self) -> bool {
        *self >= CompilerFilter::SpaceProfile
    }

    /// Returns `true` if artifacts built with this filter record boot image
    /// checksums and must be invalidated when the boot image changes.
    pub fn depends_on_image_checksum(&self) -> bool {
        self.is_aot_compilation_enabled()
    }

    /// Returns `true` if the filter verifies bytecode.
    pub fn is_verification_enabled(&self) -> bool {
        *self >= CompilerFilter::Verify
    }

    /// Returns `true` for the profile-guided filters.
    pub fn depends_on_profile(&self) -> bool {
        matches!(
            self,
            CompilerFilter::SpaceProfile
                | CompilerFilter::SpeedProfile
                | CompilerFilter::EverythingProfile
        )
    }

    /// Returns the non-profile equivalent of a profile-guided filter.
    pub fn non_profile_equivalent(&self) -> CompilerFilter {
        match self {
            CompilerFilter::SpaceProfile => CompilerFilter::Space,
            CompilerFilter::SpeedProfile => CompilerFilter::Speed,
            CompilerFilter::EverythingProfile => CompilerFilter::Everything,
            other => *other,
        }
    }
}

impl fmt::Display for CompilerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing compiler filter names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown compiler filter: '{input}'")]
pub struct ParseFilterError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for CompilerFilter {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompilerFilter::ALL
            .into_iter()
            .find(|filter| filter.as_str() == s)
            .ok_or_else(|| ParseFilterError {
                input: s.to_string(),
            })
    }
}
