//! Root-relative path handling.
//!
//! Backends only ever accept paths relative to their root. Catalog rows store
//! those paths split into a `/`-joined sub-path (`""` at the root) and a file
//! name; [`split`] and [`join`] convert between the two forms.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validates a root-relative path, resolving `.` and `..` components.
///
/// Paths that are empty after resolution, that would climb above the root,
/// that carry a platform prefix, or that contain null bytes are rejected with
/// [`InvalidPath`](ErrorKind::InvalidPath).
///
/// ```
/// use std::path::Path;
/// use bindery_storage::validate_path;
/// assert!(validate_path("Silo/Silo.epub").is_ok());
/// assert!(validate_path("a/../Dune.epub").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert_eq!(
///     validate_path("Wool/../Silo/./Silo.m4b/").unwrap(),
///     Path::new("Silo/Silo.m4b")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                // Null bytes survive Path::components() on Unix but truncate
                // paths in syscalls.
                if segment.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(segment);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

/// Split a root-relative path into its catalog form: `(sub_path, file_name)`.
///
/// The sub-path is the `/`-joined parent directory, or `""` for entries that
/// live directly under the root. Non-UTF-8 names cannot be stored and are
/// rejected.
pub fn split(path: impl AsRef<Path>) -> Result<(String, String)> {
    let validated = validate(path.as_ref())?;
    let mut segments = Vec::new();
    for component in validated.components() {
        let Some(segment) = component.as_os_str().to_str() else {
            exn::bail!(ErrorKind::InvalidPath(validated.clone()));
        };
        segments.push(segment);
    }
    // Validation guarantees at least one segment.
    let file_name = segments.pop().unwrap_or_default().to_string();
    Ok((segments.join("/"), file_name))
}

/// Inverse of [`split`].
pub fn join(sub_path: &str, file_name: &str) -> Result<PathBuf> {
    let joined = match sub_path.is_empty() {
        true => PathBuf::from(file_name),
        false => Path::new(sub_path).join(file_name),
    };
    validate(joined)
}
