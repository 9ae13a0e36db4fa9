//! Fingerprints of compilation inputs.

use std::path::Path;

use odr_oat::{format_checksums, DexChecksumSource};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A jar as it was when artifacts were compiled from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Absolute path of the jar. Identifies the component.
    pub file: String,
    /// Size in bytes.
    pub size: u64,
    /// Dex checksums formatted `%08x` and joined by `;`.
    pub checksums: String,
}

impl Component {
    /// Fingerprints the jar at `jar`.
    pub fn from_jar(jar: &str, checksums: &dyn DexChecksumSource) -> Result<Self, CacheError> {
        let path = Path::new(jar);
        let size = std::fs::metadata(path)
            .map_err(|e| CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        let info = checksums
            .dex_file_info(path)
            .map_err(|e| CacheError::Checksum {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            file: jar.to_string(),
            size,
            checksums: format_checksums(&info.checksums),
        })
    }

    /// Fingerprints every jar in order.
    pub fn from_jars(
        jars: &[String],
        checksums: &dyn DexChecksumSource,
    ) -> Result<Vec<Self>, CacheError> {
        jars.iter()
            .map(|jar| Self::from_jar(jar, checksums))
            .collect()
    }
}

/// A system server jar and whether it is loaded through the classpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemServerComponent {
    /// The jar fingerprint.
    #[serde(flatten)]
    pub component: Component,
    /// `false` for standalone jars.
    pub is_in_classpath: bool,
}

impl SystemServerComponent {
    /// Fingerprints the classpath jars followed by the standalone jars.
    pub fn from_jars(
        classpath: &[String],
        standalone: &[String],
        checksums: &dyn DexChecksumSource,
    ) -> Result<Vec<Self>, CacheError> {
        let in_classpath = classpath.iter().map(|jar| (jar, true));
        let outside = standalone.iter().map(|jar| (jar, false));
        in_classpath
            .chain(outside)
            .map(|(jar, is_in_classpath)| {
                Ok(Self {
                    component: Component::from_jar(jar, checksums)?,
                    is_in_classpath,
                })
            })
            .collect()
    }
}

/// The first difference between cached and current components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentMismatch {
    /// The number of components changed.
    #[error("component count differs ({cached} cached, {current} current)")]
    Count {
        /// Number of cached components.
        cached: usize,
        /// Number of current components.
        current: usize,
    },

    /// A component at the same position has a different path.
    #[error("component {index} differs ({cached} cached, {current} current)")]
    Path {
        /// Position in the list.
        index: usize,
        /// Cached path.
        cached: String,
        /// Current path.
        current: String,
    },

    /// A jar changed size.
    #[error("size of {file} differs ({cached} cached, {current} current)")]
    Size {
        /// The jar.
        file: String,
        /// Cached size.
        cached: u64,
        /// Current size.
        current: u64,
    },

    /// A jar's dex checksums changed.
    #[error("checksums of {file} differ ({cached} cached, {current} current)")]
    Checksums {
        /// The jar.
        file: String,
        /// Cached checksums.
        cached: String,
        /// Current checksums.
        current: String,
    },

    /// A jar moved in or out of the classpath.
    #[error("classpath membership of {file} differs")]
    Classpath {
        /// The jar.
        file: String,
    },
}

fn check_one(index: usize, cached: &Component, current: &Component) -> Result<(), ComponentMismatch> {
    if cached.file != current.file {
        return Err(ComponentMismatch::Path {
            index,
            cached: cached.file.clone(),
            current: current.file.clone(),
        });
    }
    if cached.size != current.size {
        return Err(ComponentMismatch::Size {
            file: current.file.clone(),
            cached: cached.size,
            current: current.size,
        });
    }
    if cached.checksums != current.checksums {
        return Err(ComponentMismatch::Checksums {
            file: current.file.clone(),
            cached: cached.checksums.clone(),
            current: current.checksums.clone(),
        });
    }
    Ok(())
}

/// Compares component lists element by element.
pub fn check_components(
    cached: &[Component],
    current: &[Component],
) -> Result<(), ComponentMismatch> {
    if cached.len() != current.len() {
        return Err(ComponentMismatch::Count {
            cached: cached.len(),
            current: current.len(),
        });
    }
    for (index, (a, b)) in cached.iter().zip(current).enumerate() {
        check_one(index, a, b)?;
    }
    Ok(())
}

/// Compares system server component lists, including classpath membership.
pub fn check_system_server_components(
    cached: &[SystemServerComponent],
    current: &[SystemServerComponent],
) -> Result<(), ComponentMismatch> {
    if cached.len() != current.len() {
        return Err(ComponentMismatch::Count {
            cached: cached.len(),
            current: current.len(),
        });
    }
    for (index, (a, b)) in cached.iter().zip(current).enumerate() {
        check_one(index, &a.component, &b.component)?;
        if a.is_in_classpath != b.is_in_classpath {
            return Err(ComponentMismatch::Classpath {
                file: b.component.file.clone(),
            });
        }
    }
    Ok(())
}
