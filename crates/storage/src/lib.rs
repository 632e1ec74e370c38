//! Library roots and everything that touches the bytes inside them.
//!
//! A library is made of one or more roots, each exposed as a
//! [`StorageBackend`]. Every path handed to a backend is relative to its root
//! and validated before use. On top of the backends this crate provides:
//!
//! - [`BookFormat`] detection from file extensions,
//! - sparse content [`fingerprint`]s for files and audiobook folders, and
//! - [`discover`], the directory walk that turns a root into
//!   [`DiscoveredFile`]s (collapsing multi-track audiobook folders into a
//!   single folder-based unit).

pub mod backend;
mod discover;
pub mod error;
pub mod fingerprint;
mod format;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::discover::{Discovery, discover};
pub use crate::format::BookFormat;
pub use crate::models::{DiscoveredFile, Entry, EntryKind, PathKey};
pub use crate::path::{join as join_location, split as split_location, validate as validate_path};
use std::sync::Arc;

/// Identifier of a library root, as configured.
pub type RootId = i64;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
