//! Storage models.
//!
//! [`Entry`] is what a backend reports about a path. [`DiscoveredFile`] is
//! what a directory walk hands to grouping and reconciliation, and
//! [`PathKey`] is the identity shared between discovered and catalogued
//! files.

use crate::{BookFormat, RootId, error::Result, path};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata for a single path inside a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Relative path from the root
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
    pub modified: OffsetDateTime,
}
impl Entry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Final path component, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Unique identity of a file (or folder unit) within a library: the root it
/// lives in, its `/`-joined parent directory and its own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    pub root_id: RootId,
    pub sub_path: String,
    pub file_name: String,
}
impl PathKey {
    pub fn new(root_id: RootId, sub_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            root_id,
            sub_path: sub_path.into(),
            file_name: file_name.into(),
        }
    }

    /// Path relative to the root.
    pub fn relative_path(&self) -> Result<PathBuf> {
        path::join(&self.sub_path, &self.file_name)
    }
}
impl Display for PathKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.sub_path.is_empty() {
            true => write!(f, "{}:{}", self.root_id, self.file_name),
            false => write!(f, "{}:{}/{}", self.root_id, self.sub_path, self.file_name),
        }
    }
}

/// One unit found by a directory walk.
///
/// Usually a single file; for multi-track audiobooks the unit is the
/// directory itself (`folder_based`), in which case `file_name` is the
/// directory name, `format` is taken from its first track and `size` is the
/// sum of its tracks.
///
/// Ordering follows the path key first, so sorting a list of discovered files
/// sorts it by location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveredFile {
    pub root_id: RootId,
    pub sub_path: String,
    pub file_name: String,
    pub format: BookFormat,
    pub folder_based: bool,
    pub size: u64,
}
impl DiscoveredFile {
    pub fn path_key(&self) -> PathKey {
        PathKey::new(self.root_id, self.sub_path.clone(), self.file_name.clone())
    }

    pub fn relative_path(&self) -> Result<PathBuf> {
        path::join(&self.sub_path, &self.file_name)
    }

    pub fn is_root_level(&self) -> bool {
        self.sub_path.is_empty()
    }
}
