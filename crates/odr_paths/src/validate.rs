//! Input validation. Resolvers fail closed on anything these reject.

use crate::error::PathError;

/// Checks that `path` is non-empty, NUL-free, absolute and lexically normal.
pub fn validate_absolute_normal_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if path.contains('\0') {
        return Err(PathError::ContainsNul {
            path: path.replace('\0', "\\0"),
        });
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PathError::NotAbsolute {
            path: path.to_string(),
        });
    };
    if rest.is_empty() {
        return Ok(());
    }
    let normal = rest
        .split('/')
        .all(|component| !component.is_empty() && component != "." && component != "..");
    if !normal {
        return Err(PathError::NotNormal {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Checks that `path` is a valid absolute path to an `.apk` or `.jar`.
pub fn validate_dex_path(path: &str) -> Result<(), PathError> {
    validate_absolute_normal_path(path)?;
    if !path.ends_with(".apk") && !path.ends_with(".jar") {
        return Err(PathError::BadExtension {
            path: path.to_string(),
            expected: ".apk or .jar",
        });
    }
    Ok(())
}
