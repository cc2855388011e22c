//! Validation functions for configuration values and path components.
//!
//! Identifiers coming from requests or from the cluster end up as file and
//! directory names inside the store, so they must be plain, sanitized names.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

/// Accepts a single, non-empty path component that needs no sanitizing.
pub fn validate_path_component<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new("InvalidPathComponent")
            .with_message(format!("{name:?} is not a usable name").into()));
    }

    if !is_sanitized(name) {
        return Err(ValidationError::new("InvalidPathComponent").with_message(
            format!("Invalid name {name:?}, try sanitizing like {:?}", sanitize(name)).into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access store path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}
