//! Crash-safe publishing of compiled artifacts.
//!
//! Nothing is ever written in place. A [`StagedFile`] is created beside its
//! final path as `<final>.<id>.tmp` and renamed over the final path on
//! commit, so a concurrent reader sees either the old or the new file.
//! [`commit_all_or_abandon`] extends this to a group of files plus a set of
//! deletions that either all take effect or leave every final path as it
//! was.

#![warn(missing_docs)]

pub mod error;
pub mod group;
pub mod permission;
pub mod staged;

pub use error::PublishError;
pub use group::commit_all_or_abandon;
pub use permission::{create_dir_with_permission, FsPermission};
pub use staged::StagedFile;
