//! Fault-injecting storage backend.
//!
//! Wraps another backend and fails moves into chosen destinations, so the
//! rollback paths of multi-file relocations can be exercised against a real
//! filesystem.

use crate::backend::EntryStream;
use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, Entry, EntryKind, RootId, StorageBackend, path::validate as validate_path};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage backend that fails [`rename`](StorageBackend::rename) and
/// [`adopt`](StorageBackend::adopt) into configured destinations with an
/// [`Io`](ErrorKind::Io) error. Everything else is delegated.
pub struct FlakyBackend {
    inner: BackendHandle,
    failing: Mutex<HashSet<PathBuf>>,
}
impl FlakyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every move into `path` (root-relative) fail.
    pub fn fail_moves_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = validate_path(path)?;
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(path);
        }
        Ok(())
    }

    pub fn heal(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    fn check(&self, to: &Path) -> Result<()> {
        let to = validate_path(to)?;
        let fails = self.failing.lock().map(|failing| failing.contains(&to)).unwrap_or(false);
        if fails {
            tracing::info!(path = %to.display(), "Injecting move failure");
            exn::bail!(ErrorKind::Io(std::io::Error::other(format!(
                "injected failure moving to {}",
                to.display()
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn root_id(&self) -> RootId {
        self.inner.root_id()
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }

    async fn check_root(&self) -> Result<()> {
        self.inner.check_root().await
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> EntryStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn list_dir(&self, path: Option<&Path>) -> Result<Vec<Entry>> {
        self.inner.list_dir(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        self.inner.kind(path).await
    }

    async fn stat(&self, path: &Path) -> Result<Entry> {
        self.inner.stat(path).await
    }

    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.inner.read_at(path, offset, len).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.check(to)?;
        self.inner.rename(from, to).await
    }

    async fn adopt(&self, from_absolute: &Path, to: &Path) -> Result<()> {
        self.check(to)?;
        self.inner.adopt(from_absolute, to).await
    }

    fn absolute_path(&self, path: &Path) -> Result<PathBuf> {
        self.inner.absolute_path(path)
    }

    async fn remove_empty_dirs(&self, dir: &Path, protected: &[PathBuf]) -> Result<()> {
        self.inner.remove_empty_dirs(dir, protected).await
    }
}
