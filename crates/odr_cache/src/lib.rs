//! Persistent state of the refresh loop.
//!
//! [`CacheInfo`] records what the artifacts in the artifact directory were
//! compiled from: the runtime module version, every installed module, and
//! the size and checksums of each input jar. Comparing it with the current
//! system decides what is stale. [`CompilationLog`] remembers recent
//! compilation attempts so failing compilations back off.

#![warn(missing_docs)]

pub mod cache_info;
pub mod compilation_log;
pub mod component;
pub mod error;
pub mod json;
pub mod module;

pub use cache_info::{CacheInfo, CACHE_INFO_FILE};
pub use compilation_log::{
    CompilationLog, LogEntry, Trigger, MAX_LOG_ENTRIES, SUCCESS_EXIT_CODE,
};
pub use component::{
    check_components, check_system_server_components, Component, ComponentMismatch,
    SystemServerComponent,
};
pub use error::CacheError;
pub use json::{read_json, write_json};
pub use module::{read_module_list, ApexInfo, ModuleInfo, ART_MODULE};
