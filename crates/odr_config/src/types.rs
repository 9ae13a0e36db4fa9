//! Configuration types deserialized from `odrefresh.toml`.

use odr_common::{CompilerFilter, InstructionSet};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The top-level refresh configuration parsed from `odrefresh.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Locations of tools, inputs and outputs.
    pub paths: PathsConfig,
    /// The classpaths that define the two compilation tiers.
    #[serde(default)]
    pub classpath: ClasspathConfig,
    /// Compilation settings (instruction sets, filters, budgets).
    pub compile: CompileConfig,
    /// System properties consulted for compiler resource hints.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Locations of tools, inputs and outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Root of the refreshed artifact cache. Artifacts live in per-ISA subdirectories.
    pub artifact_dir: PathBuf,
    /// The ahead-of-time compiler binary.
    pub dex2oat: PathBuf,
    /// The artifact analyzer used by the `verify` action.
    #[serde(default)]
    pub analyzer: Option<PathBuf>,
    /// JSON list describing the installed modules and their versions.
    #[serde(default = "default_apex_info_list")]
    pub apex_info_list: PathBuf,
    /// Where the compilation attempt log is persisted.
    #[serde(default = "default_compilation_log")]
    pub compilation_log: PathBuf,
    /// Root of the system partition.
    #[serde(default = "default_android_root")]
    pub android_root: PathBuf,
    /// Root of the runtime module. Boot classpath jars under it ship precompiled.
    #[serde(default = "default_art_root")]
    pub art_root: PathBuf,
    /// Directory holding the primary boot image, one subdirectory per ISA.
    #[serde(default)]
    pub boot_image_dir: Option<PathBuf>,
}

/// The classpaths that define the two compilation tiers.
///
/// Each entry accepts either a colon-separated string (the format of the
/// `BOOTCLASSPATH` environment variable) or a list of strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClasspathConfig {
    /// The full boot classpath.
    #[serde(default, deserialize_with = "deserialize_classpath")]
    pub boot_classpath: Vec<String>,
    /// The boot classpath the compiler sees, including extension jars.
    #[serde(default, deserialize_with = "deserialize_classpath")]
    pub dex2oat_boot_classpath: Vec<String>,
    /// Jars loaded into the system server, in classpath order.
    #[serde(default, deserialize_with = "deserialize_classpath")]
    pub system_server_classpath: Vec<String>,
    /// System server jars compiled but loaded outside the classpath.
    #[serde(default, deserialize_with = "deserialize_classpath")]
    pub standalone_system_server_jars: Vec<String>,
}

/// Compilation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CompileConfig {
    /// Instruction sets to compile boot extensions for.
    pub boot_extension_isas: Vec<InstructionSet>,
    /// Instruction set of the system server process.
    pub system_server_isa: InstructionSet,
    /// Filter used for boot extension compilation.
    #[serde(default = "default_boot_filter")]
    pub boot_extension_compiler_filter: CompilerFilter,
    /// Filter used for system server jars. Defaults to `speed-profile` when a
    /// profile is available and `speed` otherwise.
    #[serde(default)]
    pub system_server_compiler_filter: Option<CompilerFilter>,
    /// Wall-clock budget for a whole compile run.
    #[serde(default = "default_max_execution_seconds")]
    pub max_execution_seconds: u64,
    /// Upper bound on one compiler invocation.
    #[serde(default = "default_max_child_process_seconds")]
    pub max_child_process_seconds: u64,
    /// Lower bound on one compiler invocation while budget remains.
    #[serde(default = "default_min_child_process_seconds")]
    pub min_child_process_seconds: u64,
    /// Recompile only what the check marked, keeping valid artifacts.
    #[serde(default = "default_true")]
    pub partial_compilation: bool,
    /// Refresh the modification times of artifacts that are kept.
    #[serde(default = "default_true")]
    pub refresh: bool,
    /// Log compiler invocations instead of running them.
    #[serde(default)]
    pub dry_run: bool,
}

impl RefreshConfig {
    /// Returns boot classpath jars that need an on-device compiled extension.
    ///
    /// Jars shipped inside the runtime module already have a primary boot
    /// image and are skipped.
    pub fn boot_extension_compilable_jars(&self) -> Vec<String> {
        self.classpath
            .dex2oat_boot_classpath
            .iter()
            .filter(|jar| !Path::new(jar).starts_with(&self.paths.art_root))
            .cloned()
            .collect()
    }

    /// Returns every system server jar to compile: the classpath followed by
    /// the standalone jars.
    pub fn all_system_server_jars(&self) -> Vec<String> {
        self.classpath
            .system_server_classpath
            .iter()
            .chain(self.classpath.standalone_system_server_jars.iter())
            .cloned()
            .collect()
    }

    /// Returns the directory containing the primary boot image.
    pub fn boot_image_dir(&self) -> PathBuf {
        self.paths
            .boot_image_dir
            .clone()
            .unwrap_or_else(|| self.paths.art_root.join("javalib"))
    }

    /// Returns the profile used for boot extension compilation.
    pub fn boot_profile(&self) -> PathBuf {
        self.paths.android_root.join("etc").join("boot-image.prof")
    }

    /// Looks up a system property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

fn default_apex_info_list() -> PathBuf {
    PathBuf::from("/apex/apex-info-list.json")
}

fn default_compilation_log() -> PathBuf {
    PathBuf::from("/data/misc/odrefresh/compilation-log.json")
}

fn default_android_root() -> PathBuf {
    PathBuf::from("/system")
}

fn default_art_root() -> PathBuf {
    PathBuf::from("/apex/com.android.art")
}

fn default_boot_filter() -> CompilerFilter {
    CompilerFilter::SpeedProfile
}

fn default_max_execution_seconds() -> u64 {
    480
}

fn default_max_child_process_seconds() -> u64 {
    90
}

fn default_min_child_process_seconds() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Deserializes a classpath that is either `"a.jar:b.jar"` or `["a.jar", "b.jar"]`.
fn deserialize_classpath<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Classpath;

    impl<'de> Visitor<'de> for Classpath {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a colon-separated string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.split(':')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(Classpath)
}

#[cfg(test)]
mod tests {
    use crate::loader::load_config_from_str;

    const BASE: &str = r#"
[paths]
artifact_dir = "/data/misc/apexdata/com.android.art/dalvik-cache"
dex2oat = "/apex/com.android.art/bin/dex2oat64"

[classpath]
boot_classpath = "/apex/com.android.art/javalib/core-oj.jar:/system/framework/framework.jar"
dex2oat_boot_classpath = [
    "/apex/com.android.art/javalib/core-oj.jar",
    "/system/framework/framework.jar",
    "/system/framework/ext.jar",
]
system_server_classpath = "/system/framework/services.jar"

[compile]
boot_extension_isas = ["arm64", "arm"]
system_server_isa = "arm64"
"#;

    #[test]
    fn classpath_accepts_string_and_list() {
        let config = load_config_from_str(BASE).unwrap();
        assert_eq!(config.classpath.boot_classpath.len(), 2);
        assert_eq!(config.classpath.dex2oat_boot_classpath.len(), 3);
        assert_eq!(
            config.classpath.system_server_classpath,
            vec!["/system/framework/services.jar"]
        );
        assert!(config.classpath.standalone_system_server_jars.is_empty());
    }

    #[test]
    fn compilable_jars_skip_runtime_module() {
        let config = load_config_from_str(BASE).unwrap();
        assert_eq!(
            config.boot_extension_compilable_jars(),
            vec!["/system/framework/framework.jar", "/system/framework/ext.jar"]
        );
    }

    #[test]
    fn all_system_server_jars_appends_standalone() {
        let toml = BASE.replace(
            "system_server_classpath = \"/system/framework/services.jar\"",
            "system_server_classpath = \"/system/framework/services.jar\"\nstandalone_system_server_jars = [\"/apex/com.android.foo/javalib/foo.jar\"]",
        );
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(
            config.all_system_server_jars(),
            vec![
                "/system/framework/services.jar",
                "/apex/com.android.foo/javalib/foo.jar"
            ]
        );
    }

    #[test]
    fn derived_paths() {
        let config = load_config_from_str(BASE).unwrap();
        assert_eq!(
            config.boot_image_dir().to_str(),
            Some("/apex/com.android.art/javalib")
        );
        assert_eq!(
            config.boot_profile().to_str(),
            Some("/system/etc/boot-image.prof")
        );
        assert!(config.property("dalvik.vm.boot-dex2oat-threads").is_none());
    }
}
