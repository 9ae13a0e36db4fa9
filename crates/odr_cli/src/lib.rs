//! Shared pieces of the `odrefresh` and `dexoptanalyzer` binaries.

#![warn(missing_docs)]

pub mod logger;
