mod book;
mod file;

pub use self::book::{BookMetadata, CatalogBook, NewBook};
pub(crate) use self::book::BookRow;
pub use self::file::{CatalogFile, FileLocation, NewFile};
pub(crate) use self::file::FileRow;

pub type BookId = i64;
pub type FileId = i64;
pub type LibraryId = i64;
