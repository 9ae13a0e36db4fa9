//! Resource hints for the compiler, derived from system properties.

use std::collections::{BTreeMap, HashMap};

/// How urgent a compilation is. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    /// Idle-time maintenance.
    Background,
    /// Work a user is waiting for.
    Interactive,
    /// Work a user is waiting for right now, such as a restore.
    InteractiveFast,
    /// Compilation during boot.
    Boot,
}

/// Read access to system properties.
pub trait SystemProperties {
    /// Returns the value of `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

impl SystemProperties for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

impl SystemProperties for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// CPU placement and parallelism for one compiler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceHints {
    /// Value for `--cpu-set`.
    pub cpu_set: Option<String>,
    /// Value for `-j`.
    pub threads: Option<String>,
}

impl ResourceHints {
    /// Looks up the hints for `priority`.
    ///
    /// Restore and background work fall back to the default
    /// `dalvik.vm.dex2oat-*` properties; boot work does not.
    pub fn for_priority(priority: PriorityClass, props: &dyn SystemProperties) -> Self {
        let lookup = |name: &str| {
            let default = || props.get(&format!("dalvik.vm.dex2oat-{name}"));
            let value = match priority {
                PriorityClass::Boot => props.get(&format!("dalvik.vm.boot-dex2oat-{name}")),
                PriorityClass::InteractiveFast => props
                    .get(&format!("dalvik.vm.restore-dex2oat-{name}"))
                    .or_else(default),
                PriorityClass::Background => props
                    .get(&format!("dalvik.vm.background-dex2oat-{name}"))
                    .or_else(default),
                PriorityClass::Interactive => default(),
            };
            value.filter(|v| !v.is_empty())
        };
        Self {
            cpu_set: lookup("cpu-set"),
            threads: lookup("threads"),
        }
    }

    /// Appends `--cpu-set` and `-j` for whichever hints are set.
    pub fn add_to(&self, args: &mut crate::CmdlineBuilder) {
        args.add_if_non_empty("--cpu-set=", self.cpu_set.as_deref().unwrap_or(""));
        args.add_if_non_empty("-j", self.threads.as_deref().unwrap_or(""));
    }
}
