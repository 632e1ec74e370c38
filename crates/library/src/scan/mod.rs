//! Scan orchestration.
//!
//! A scan walks every root of a library, matches what it finds against the
//! catalog and applies the result. At most one scan per library runs at a
//! time; see [`ScanLocks`].

mod locks;

pub use self::locks::{ScanGuard, ScanLocks};
use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::library::Library;
use crate::reconcile::{self, ReconcileReport};
use bindery_catalog::LibraryId;
use bindery_storage::discover;
use exn::ResultExt;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub library_id: LibraryId,
    /// Units found on disk (folder-based audiobooks count once)
    pub discovered: usize,
    /// Entries that could not be read
    pub discovery_errors: usize,
    pub reconcile: ReconcileReport,
    pub elapsed: Duration,
}

pub struct Scanner<'a> {
    ctx: &'a Context,
}
impl<'a> Scanner<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Scan (or rescan) a library.
    ///
    /// # Errors
    /// - [`ErrorKind::ScanInProgress`] if the library is already being scanned.
    /// - [`ErrorKind::RootNotFound`] if any root is missing; nothing is changed.
    /// - [`ErrorKind::Scan`] if the catalog can't be read.
    ///
    /// Problems with individual files are logged and counted in the report.
    #[instrument(skip_all, fields(library = library.id))]
    pub async fn scan_library(&self, library: &Library) -> Result<ScanReport> {
        let _guard = self.ctx.locks.try_acquire(library.id)?;
        let started = Instant::now();

        // A vanished root (unmounted drive) would otherwise look like every
        // one of its books was deleted.
        for root in library.roots() {
            root.check_root().await.or_raise(|| ErrorKind::RootNotFound(root.root_id()))?;
        }

        let mut discovered = Vec::new();
        let mut incomplete = HashSet::new();
        let mut discovery_errors = 0;
        for root in library.roots() {
            let discovery = discover(&**root).await;
            if !discovery.errors.is_empty() {
                tracing::warn!(root = root.root_id(), errors = discovery.errors.len(), "Root was not fully walked");
                incomplete.insert(root.root_id());
                discovery_errors += discovery.errors.len();
            }
            discovered.extend(discovery.files);
        }

        let books = self.ctx.catalog.find_by_library(library.id).await.or_raise(|| ErrorKind::Scan)?;
        let fileless = self.ctx.catalog.find_fileless_books(library.id).await.or_raise(|| ErrorKind::Scan)?;
        let plan = reconcile::plan(&discovered, &books, &fileless, library.strategy, &incomplete);
        let reconcile = match plan.is_empty() {
            true => ReconcileReport::default(),
            false => reconcile::apply(self.ctx, library, plan).await,
        };

        let report = ScanReport {
            library_id: library.id,
            discovered: discovered.len(),
            discovery_errors,
            reconcile,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            discovered = report.discovered,
            elapsed_ms = report.elapsed.as_millis(),
            "Scan complete"
        );
        Ok(report)
    }
}
