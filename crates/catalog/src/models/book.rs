use crate::error::{Error, ErrorKind};
use crate::models::{BookId, CatalogFile, LibraryId};
use exn::ResultExt;
use time::UtcDateTime;

/// Descriptive metadata of a book. Every field is optional: files named
/// badly enough may yield nothing useful.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub series_name: Option<String>,
    pub series_number: Option<f64>,
}

/// A logical book and every file currently backing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogBook {
    pub id: BookId,
    pub library_id: LibraryId,
    pub metadata: BookMetadata,
    pub created_at: UtcDateTime,
    /// Files, primary first
    pub files: Vec<CatalogFile>,
}
impl CatalogBook {
    /// Books without files are placeholders and are never removed by
    /// reconciliation.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn primary_file(&self) -> Option<&CatalogFile> {
        self.files.iter().find(|file| file.is_primary)
    }
}

/// A book about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub library_id: LibraryId,
    pub metadata: BookMetadata,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) id: i64,
    pub(crate) library_id: i64,
    pub(crate) title: Option<String>,
    pub(crate) series_name: Option<String>,
    pub(crate) series_number: Option<f64>,
    pub(crate) created_at: i64,
}
impl BookRow {
    pub(crate) fn into_book(self, files: Vec<CatalogFile>) -> Result<CatalogBook, Error> {
        Ok(CatalogBook {
            id: self.id,
            library_id: self.library_id,
            metadata: BookMetadata {
                title: self.title,
                series_name: self.series_name,
                series_number: self.series_number,
            },
            created_at: UtcDateTime::from_unix_timestamp(self.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            files,
        })
    }
}
