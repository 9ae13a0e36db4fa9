//! What a compilation run should produce.

use std::collections::BTreeSet;

use odr_common::InstructionSet;
use odr_config::RefreshConfig;

/// The stale units found by a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationOptions {
    /// Instruction sets whose boot image extension must be compiled.
    pub boot_isas: BTreeSet<InstructionSet>,
    /// System server jars to compile. Compilation follows classpath order
    /// regardless of the set's order.
    pub system_server_jars: BTreeSet<String>,
}

impl CompilationOptions {
    /// Every unit named by `config`.
    pub fn all(config: &RefreshConfig) -> Self {
        Self {
            boot_isas: config.compile.boot_extension_isas.iter().copied().collect(),
            system_server_jars: config.all_system_server_jars().into_iter().collect(),
        }
    }

    /// Returns `true` if nothing needs compiling.
    pub fn is_empty(&self) -> bool {
        self.boot_isas.is_empty() && self.system_server_jars.is_empty()
    }

    /// Marks every system server jar of `config`.
    pub fn mark_all_system_server_jars(&mut self, config: &RefreshConfig) {
        self.system_server_jars
            .extend(config.all_system_server_jars());
    }
}
