//! On-disk cache of generated cover images.
//!
//! Covers live at `<dir>/<book id>.jpg`; resized thumbnails, when some other
//! component produces them, go in a `<dir>/<book id>/` directory. Both are
//! removed together when a book is deleted.

use crate::error::{ErrorKind, Result};
use bindery_catalog::BookId;
use exn::ResultExt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct CoverCache {
    dir: PathBuf,
}
impl CoverCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cover_path(&self, book_id: BookId) -> PathBuf {
        self.dir.join(format!("{book_id}.jpg"))
    }

    fn thumbnail_dir(&self, book_id: BookId) -> PathBuf {
        self.dir.join(book_id.to_string())
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn store(&self, book_id: BookId, image: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await.or_raise(|| ErrorKind::Covers)?;
        let path = self.cover_path(book_id);
        fs::write(&path, image).await.or_raise(|| ErrorKind::Covers)?;
        Ok(path)
    }

    /// Remove a book's cover and thumbnails. Missing artifacts are fine.
    #[instrument(skip(self))]
    pub async fn remove(&self, book_id: BookId) -> Result<()> {
        match fs::remove_file(self.cover_path(book_id)).await {
            Ok(()) => tracing::debug!(book = book_id, "Removed cover"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {},
            Err(e) => Err(e).or_raise(|| ErrorKind::Covers)?,
        }
        match fs::remove_dir_all(self.thumbnail_dir(book_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).or_raise(|| ErrorKind::Covers),
        }
    }
}
