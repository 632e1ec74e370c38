//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Relocation has its own, finer
//! grained kinds in [`organize::error`](crate::organize::error).

use bindery_catalog::LibraryId;
use bindery_storage::RootId;
use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid library configuration")]
    Config,
    #[display("issue with path generation from template")]
    Template,
    #[display("library scan failed")]
    Scan,
    #[display("failed to organize book")]
    Organize,
    #[display("format processor failed")]
    Processor,
    #[display("cover cache failure")]
    Covers,
    /// Duplicate scan requests are rejected, never queued.
    #[display("library {_0} is already being scanned")]
    ScanInProgress(#[error(not(source))] LibraryId),
    /// A configured root is gone; the whole scan is abandoned.
    #[display("library root {_0} does not exist")]
    RootNotFound(#[error(not(source))] RootId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ScanInProgress(_) | Self::RootNotFound(_))
    }
}
