//! Turning library roots into books, and keeping them tidy.
//!
//! A [`Library`] is a set of roots (storage backends). The [`Scanner`] walks
//! every root, groups newly discovered files into books on the first scan and
//! [reconciles](reconcile) them against the catalog on every scan after that.
//! [`organize`](organize::organize) moves books to the paths a
//! [`PathGenerator`] template gives them, atomically per book.
//!
//! Everything a scan or relocation needs beyond the library itself lives in a
//! [`Context`]: the catalog, the naming template, format processors, the cover
//! cache and the file watcher to pause while files move.

mod context;
mod covers;
pub mod error;
mod group;
mod library;
pub mod organize;
mod processor;
pub mod reconcile;
mod scan;
mod template;
#[cfg(test)]
mod testing;
mod watch;

pub use crate::context::Context;
pub use crate::covers::CoverCache;
pub use crate::group::{GroupKey, Groups, group_files};
pub use crate::library::Library;
pub use crate::processor::{FilenameProcessor, FormatProcessor, ProcessorRegistry};
pub use crate::reconcile::{MAX_FINGERPRINT_CONCURRENCY, ReconcilePlan, ReconcileReport};
pub use crate::scan::{ScanGuard, ScanLocks, ScanReport, Scanner};
pub use crate::template::PathGenerator;
pub use crate::watch::{NoopWatcher, WatchRegistry, Watcher};
