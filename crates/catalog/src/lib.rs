//! Durable catalog of logical books.
//!
//! A [`CatalogBook`] is what a reader thinks of as "a book"; it is backed by
//! zero or more [`CatalogFile`]s (formats of the same work, or folder-based
//! audiobooks). Books without files are placeholders waiting for their first
//! file to be discovered.
//!
//! Files are identified by their [`PathKey`](bindery_storage::PathKey)
//! (root, sub-path, file name); the store enforces that no two files share a
//! location and that a book has at most one primary file. Every mutating
//! operation on the [`Repository`] runs in its own transaction.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{
    BookId, BookMetadata, CatalogBook, CatalogFile, FileId, FileLocation, LibraryId, NewBook, NewFile,
};
pub use crate::repo::Repository;
