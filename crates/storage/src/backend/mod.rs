//! Storage backend trait and implementations.
//!
//! Each configured library root is one [`StorageBackend`]. Everything above
//! this crate (fingerprinting, discovery, relocation) talks to roots only
//! through this trait, which keeps the relocation rollback paths testable
//! with a fault-injecting decorator.

#[cfg(feature = "mock")]
mod flaky;
mod local;

#[cfg(feature = "mock")]
pub use self::flaky::FlakyBackend;
pub use self::local::LocalBackend;
use crate::error::Result;
use crate::{Entry, EntryKind, RootId};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;

/// Unified interface for a library root.
///
/// # Path Handling
/// All paths are relative to the root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation; only [`adopt()`](Self::adopt) accepts an
/// absolute source path, because it moves entries between roots.
///
/// # Hidden Entries
/// Names starting with `.` are never listed. Relocation stages files under
/// hidden temporary names, so in-flight moves stay invisible to scans.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use bindery_storage::{StorageBackend, error::Result};
///
/// async fn size_of_book(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("Silo/Silo.epub");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Identifier of the configured root (used for catalog keys and logging).
    fn root_id(&self) -> RootId;

    /// Absolute location of the root.
    fn root(&self) -> &Path;

    /// Verify the root exists and is a directory.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) when it has
    /// vanished (an unmounted drive, for example).
    async fn check_root(&self) -> Result<()>;

    /// List all regular files under an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<Entry>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream every regular file under an optional prefix, recursively.
    ///
    /// Per-entry failures are yielded as errors without ending the stream.
    /// Asking for a prefix that does not exist yields nothing.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use bindery_storage::{StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(entry) = stream.try_next().await? {
    ///     println!("{}: {} bytes", entry.path.display(), entry.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> EntryStream<'a>;

    /// Direct children (files and directories) of a directory, or of the root
    /// when `path` is `None`. Sorted by name.
    async fn list_dir(&self, path: Option<&Path>) -> Result<Vec<Entry>>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Kind of entry at `path`, or `None` if nothing is there.
    async fn kind(&self, path: &Path) -> Result<Option<EntryKind>>;

    /// Metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing
    /// exists at `path`.
    async fn stat(&self, path: &Path) -> Result<Entry>;

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Reads past the end of the file return a short (possibly empty) buffer.
    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Rename/move a file or directory within this root.
    ///
    /// # Notes
    /// - Parent directories of the destination are created as needed.
    /// - Never overwrites: an occupied destination fails with
    ///   [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists).
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Move an entry from an absolute location (usually inside another root)
    /// to `to` inside this root. Same overwrite rules as
    /// [`rename()`](Self::rename).
    async fn adopt(&self, from_absolute: &Path, to: &Path) -> Result<()>;

    /// Absolute location of a validated relative path.
    fn absolute_path(&self, path: &Path) -> Result<PathBuf>;

    /// Remove `dir` if empty, then each newly-emptied parent in turn.
    ///
    /// Stops at the first non-empty directory, at the root itself, or at any
    /// absolute path listed in `protected` (other library roots nested inside
    /// this one).
    async fn remove_empty_dirs(&self, dir: &Path, protected: &[PathBuf]) -> Result<()>;
}
