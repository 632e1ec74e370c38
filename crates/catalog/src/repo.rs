//! Repository for books and their files.
//!
//! Books and files are managed together: a file can't exist without its book,
//! and deleting a book cascades to its files. Every mutating method is one
//! transaction, so a failure leaves the catalog exactly as it was.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    BookId, BookRow, CatalogBook, CatalogFile, FileId, FileLocation, FileRow, LibraryId, NewBook, NewFile,
};
use bindery_storage::PathKey;
use exn::{OptionExt, ResultExt};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use time::UtcDateTime;
use tracing::instrument;

/// Repository for the catalog database.
///
/// # Invariants
///
/// - A location (`root_id`, `sub_path`, `file_name`) holds at most one file.
/// - A book has at most one primary file; attaching or promoting a primary
///   demotes the previous one in the same transaction.
/// - Soft-deleted books are invisible to every query.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn size(size: u64) -> Result<i64> {
        i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.or_raise(|| ErrorKind::Database)
    }

    async fn insert_file(tx: &mut Transaction<'_, Sqlite>, book_id: BookId, file: &NewFile, now: i64) -> Result<FileId> {
        sqlx::query_scalar(include_str!("../queries/insert_file.sql"))
            .bind(book_id)
            .bind(file.root_id)
            .bind(&file.sub_path)
            .bind(&file.file_name)
            .bind(file.is_primary)
            .bind(file.folder_based)
            .bind(file.format.to_string())
            .bind(Self::size(file.size)?)
            .bind(&file.hash)
            .bind(&file.hash)
            .bind(now)
            .fetch_one(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn set_primary(tx: &mut Transaction<'_, Sqlite>, book_id: BookId, file_id: FileId) -> Result<()> {
        sqlx::query(include_str!("../queries/clear_primary.sql"))
            .bind(book_id)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let result = sqlx::query(include_str!("../queries/set_primary.sql"))
            .bind(file_id)
            .bind(book_id)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::FileNotFound(file_id));
        }
        Ok(())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Create a book together with its initial files.
    ///
    /// Returns [`Constraint`](ErrorKind::Constraint) if more than one file is
    /// flagged primary, or if any file's location is already catalogued.
    #[instrument(skip_all, fields(library = book.library_id, files = files.len()))]
    pub async fn create_book(&self, book: &NewBook, files: &[NewFile]) -> Result<CatalogBook> {
        if files.iter().filter(|f| f.is_primary).count() > 1 {
            exn::bail!(ErrorKind::Constraint);
        }
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.begin().await?;
        let book_id: BookId = sqlx::query_scalar(include_str!("../queries/insert_book.sql"))
            .bind(book.library_id)
            .bind(&book.metadata.title)
            .bind(&book.metadata.series_name)
            .bind(book.metadata.series_number)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for file in files {
            Self::insert_file(&mut tx, book_id, file, now)
                .await
                .or_raise(|| ErrorKind::Constraint)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        self.find_book(book_id).await?.ok_or_raise(|| ErrorKind::BookNotFound(book_id))
    }

    /// Attach a file to an existing book.
    ///
    /// A primary file demotes the book's current primary.
    #[instrument(skip(self, file), fields(file = %file.file_name))]
    pub async fn attach_file(&self, book_id: BookId, file: &NewFile) -> Result<CatalogFile> {
        let mut tx = self.begin().await?;
        let exists: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if exists.is_none() {
            exn::bail!(ErrorKind::BookNotFound(book_id));
        }
        let now = UtcDateTime::now().unix_timestamp();
        let file_id = match file.is_primary {
            true => {
                let demoted = NewFile { is_primary: false, ..file.clone() };
                let file_id = Self::insert_file(&mut tx, book_id, &demoted, now)
                    .await
                    .or_raise(|| ErrorKind::Constraint)?;
                Self::set_primary(&mut tx, book_id, file_id).await?;
                file_id
            },
            false => Self::insert_file(&mut tx, book_id, file, now)
                .await
                .or_raise(|| ErrorKind::Constraint)?,
        };
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        let row: FileRow = sqlx::query_as(include_str!("../queries/get_file.sql"))
            .bind(file_id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.try_into()
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get a live book and its files.
    pub async fn find_book(&self, book_id: BookId) -> Result<Option<CatalogBook>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let files: Vec<FileRow> = sqlx::query_as(include_str!("../queries/get_files_for_book.sql"))
            .bind(book_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let files = files.into_iter().map(CatalogFile::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Some(row.into_book(files)?))
    }

    /// Get the file catalogued at a location.
    pub async fn find_by_path_key(&self, key: &PathKey) -> Result<Option<CatalogFile>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/get_file_by_path_key.sql"))
            .bind(key.root_id)
            .bind(&key.sub_path)
            .bind(&key.file_name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CatalogFile::try_from).transpose()
    }

    /// Every live book of a library (including fileless ones), ordered by id.
    pub async fn find_by_library(&self, library_id: LibraryId) -> Result<Vec<CatalogBook>> {
        let books: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books_for_library.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let files: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_files_for_library.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut by_book: HashMap<BookId, Vec<CatalogFile>> = HashMap::new();
        for row in files {
            let file = CatalogFile::try_from(row)?;
            by_book.entry(file.book_id).or_default().push(file);
        }
        books
            .into_iter()
            .map(|row| {
                let files = by_book.remove(&row.id).unwrap_or_default();
                row.into_book(files)
            })
            .collect()
    }

    /// Live books of a library that have no files.
    pub async fn find_fileless_books(&self, library_id: LibraryId) -> Result<Vec<CatalogBook>> {
        let books: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_fileless_books.sql"))
            .bind(library_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        books.into_iter().map(|row| row.into_book(Vec::new())).collect()
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Remove files from a book, optionally promoting one of its remaining
    /// files to primary in the same transaction.
    #[instrument(skip(self))]
    pub async fn delete_files(&self, book_id: BookId, file_ids: &[FileId], promote: Option<FileId>) -> Result<()> {
        let mut tx = self.begin().await?;
        for &file_id in file_ids {
            let result = sqlx::query(include_str!("../queries/delete_file.sql"))
                .bind(file_id)
                .bind(book_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            if result.rows_affected() == 0 {
                exn::bail!(ErrorKind::FileNotFound(file_id));
            }
        }
        if let Some(file_id) = promote {
            Self::set_primary(&mut tx, book_id, file_id).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    /// Make `file_id` the book's primary file.
    #[instrument(skip(self))]
    pub async fn promote_primary(&self, book_id: BookId, file_id: FileId) -> Result<()> {
        let mut tx = self.begin().await?;
        Self::set_primary(&mut tx, book_id, file_id).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    /// Delete a book.
    ///
    /// A soft delete keeps the book row (marked deleted) but always drops its
    /// files, so their locations can be catalogued again.
    #[instrument(skip(self))]
    pub async fn delete_book(&self, book_id: BookId, soft: bool) -> Result<()> {
        let mut tx = self.begin().await?;
        let result = match soft {
            true => {
                sqlx::query(include_str!("../queries/delete_files_for_book.sql"))
                    .bind(book_id)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                sqlx::query(include_str!("../queries/soft_delete_book.sql"))
                    .bind(UtcDateTime::now().unix_timestamp())
                    .bind(book_id)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?
            },
            false => sqlx::query(include_str!("../queries/delete_book.sql"))
                .bind(book_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?,
        };
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::BookNotFound(book_id));
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    /// Record new locations for relocated files, all or nothing.
    ///
    /// Files are parked on unique placeholder locations first, so files of the
    /// same book may swap places without tripping the location index.
    #[instrument(skip_all, fields(files = locations.len()))]
    pub async fn update_file_locations(&self, locations: &[FileLocation]) -> Result<()> {
        let mut tx = self.begin().await?;
        for location in locations {
            let result = sqlx::query(include_str!("../queries/park_file.sql"))
                .bind(location.file_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            if result.rows_affected() == 0 {
                exn::bail!(ErrorKind::FileNotFound(location.file_id));
            }
        }
        for location in locations {
            sqlx::query(include_str!("../queries/update_file_location.sql"))
                .bind(location.root_id)
                .bind(&location.sub_path)
                .bind(&location.file_name)
                .bind(location.file_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Constraint)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    /// Record a fresh fingerprint (and size) for a file whose content
    /// changed. The initial hash is never touched.
    #[instrument(skip(self))]
    pub async fn update_current_hash(&self, file_id: FileId, hash: &str, size: u64) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/update_current_hash.sql"))
            .bind(hash)
            .bind(Self::size(size)?)
            .bind(file_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::FileNotFound(file_id));
        }
        Ok(())
    }
}
