//! Shared foundational types used across the on-device refresh workspace.
//!
//! This crate provides instruction sets, compiler filters, content hashing and
//! the small error types every other crate builds on.

#![warn(missing_docs)]

pub mod filter;
pub mod hash;
pub mod isa;

pub use filter::{CompilerFilter, ParseFilterError};
pub use hash::ContentHash;
pub use isa::{InstructionSet, ParseIsaError};
