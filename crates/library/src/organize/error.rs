//! Error types for the [`organize`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use bindery_catalog::LibraryId;
use bindery_storage::RootId;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// An organize error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for organize operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an organize failure.
///
/// ### Inconsistencies (nothing was moved)
/// - [`ErrorKind::SourceMissing`]
/// - [`ErrorKind::Conflict`]
/// - [`ErrorKind::NoFiles`]
/// - [`ErrorKind::RootNotFound`]
/// - [`ErrorKind::ScanInProgress`]
///
/// ### Partial commits
/// - [`ErrorKind::Rollback`] - files were moved back; the cause is the
///   child error.
/// - [`ErrorKind::Interrupted`] - the task moving the files died; files may
///   be left staged.
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Catalog`]
/// - [`ErrorKind::Template`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A storage backend operation (stat, rename, adopt) failed.
    #[display("storage operation failed")]
    Storage,
    /// Reading or updating the catalog failed.
    #[display("catalog operation failed")]
    Catalog,
    /// The [`PathGenerator`](crate::PathGenerator) could not render a path.
    #[display("could not generate target path")]
    Template,
    /// A file of the book is not where the catalog says it is.
    #[display("source missing: {}", _0.display())]
    SourceMissing(#[error(not(source))] PathBuf),
    /// Two files would land on the same path, or the path is taken by
    /// something that is not part of the book.
    #[display("target occupied: {}", _0.display())]
    Conflict(#[error(not(source))] PathBuf),
    #[display("book has no files")]
    NoFiles,
    #[display("library has no root {_0}")]
    RootNotFound(#[error(not(source))] RootId),
    /// The library is being scanned (or another book of it relocated).
    #[display("library {_0} is busy")]
    ScanInProgress(#[error(not(source))] LibraryId),
    /// The relocation failed part-way and was undone.
    #[display("relocation rolled back")]
    Rollback,
    #[display("relocation task did not finish")]
    Interrupted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Catalog | Self::Rollback | Self::ScanInProgress(_))
    }
}
