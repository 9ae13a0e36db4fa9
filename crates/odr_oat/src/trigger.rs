//! Conditions under which an existing artifact should be recompiled.

use odr_common::CompilerFilter;

/// Independent reasons a caller is willing to recompile for.
///
/// An all-false trigger never asks for recompilation of a usable artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DexOptTrigger {
    /// Recompile if the target filter is better than the current one.
    pub target_filter_is_better: bool,
    /// Recompile if the target filter equals the current one.
    pub target_filter_is_same: bool,
    /// Recompile if the target filter is worse than the current one.
    pub target_filter_is_worse: bool,
    /// Recompile artifacts built without a boot image once one is usable.
    pub primary_boot_image_becomes_usable: bool,
    /// Recompile artifacts that lack dex code the source cannot supply
    /// uncompressed.
    pub need_extraction: bool,
}

impl DexOptTrigger {
    /// The trigger used for a regular dexopt towards `target`.
    ///
    /// A changed profile also recompiles at the same filter when `target`
    /// is profile guided.
    pub fn for_dexopt(profile_changed: bool, target: CompilerFilter) -> Self {
        Self {
            target_filter_is_better: true,
            target_filter_is_same: profile_changed && target.depends_on_profile(),
            target_filter_is_worse: false,
            primary_boot_image_becomes_usable: true,
            need_extraction: true,
        }
    }

    /// Only recompile to move to a worse filter.
    pub fn downgrade() -> Self {
        Self {
            target_filter_is_worse: true,
            ..Self::default()
        }
    }

    /// Recompile regardless of the current filter.
    pub fn force() -> Self {
        Self {
            target_filter_is_better: true,
            target_filter_is_same: true,
            target_filter_is_worse: true,
            ..Self::default()
        }
    }
}
