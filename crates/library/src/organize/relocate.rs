use crate::Context;
use crate::library::Library;
use crate::organize::error::{ErrorKind, Result};
use crate::scan::ScanGuard;
use crate::watch::Watcher;
use bindery_catalog::{BookId, CatalogBook, FileLocation, LibraryId, Repository};
use bindery_storage::error::Result as StorageResult;
use bindery_storage::{BackendHandle, EntryKind, RootId, split_location};
use exn::{OptionExt, ResultExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{Instrument, instrument};

/// Suffix of the hidden names files are parked under while a book moves.
const STAGED_SUFFIX: &str = "bindery-staged";

/// The outcome of (successfully) relocating a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The primary file already sits at its target; nothing was touched.
    AlreadyCorrect(BookId),
    /// Files were moved and the catalog updated.
    Relocated { book_id: BookId, files: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    Staged,
    Committed,
}

struct Move {
    backend: BackendHandle,
    folder_based: bool,
    source: PathBuf,
    staged: PathBuf,
    target: PathBuf,
    location: FileLocation,
    stage: Stage,
}

/// Move `from` in one root to `to` in another (or the same) root.
async fn transfer(from_backend: &BackendHandle, from: &Path, to_backend: &BackendHandle, to: &Path) -> StorageResult<()> {
    if from_backend.root_id() == to_backend.root_id() {
        return to_backend.rename(from, to).await;
    }
    let absolute = from_backend.absolute_path(from)?;
    to_backend.adopt(&absolute, to).await
}

fn parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

/// Move every file of a book to the path the naming template gives it,
/// inside `target_root`.
///
/// Either every file ends up at its target and the catalog records the new
/// locations, or every file is back where it started and the catalog is
/// untouched:
///
/// 1. **Validate**: every source exists with the expected kind
///    ([`SourceMissing`](ErrorKind::SourceMissing)), and no target collides
///    with another target or with anything that isn't one of the book's own
///    files ([`Conflict`](ErrorKind::Conflict)).
/// 2. **Stage**: every source is renamed to a hidden sibling.
/// 3. **Commit**: every staged file is moved to its target.
/// 4. **Persist**: all new locations are written in one transaction.
/// 5. **Cleanup**: emptied source directories are removed (never a library
///    root).
///
/// A failure in steps 2 to 4 moves everything back and is raised as
/// [`Rollback`](ErrorKind::Rollback) over the original error.
///
/// The library is claimed in [`ScanLocks`](crate::ScanLocks) for the whole
/// relocation, so it fails with [`ScanInProgress`](ErrorKind::ScanInProgress)
/// while the library is being scanned (and scans fail while it moves).
/// Watched libraries are unregistered from the watcher (and given the
/// configured drain interval) for the duration of the physical moves, and
/// registered again whatever the outcome.
///
/// Steps 2 to 5 run on their own task: dropping the returned future does not
/// interrupt them, the lock and the watcher registration are released once
/// they finish.
#[instrument(skip_all, fields(book = book.id, target_root))]
pub async fn relocate_book(ctx: &Context, library: &Library, book: &CatalogBook, target_root: RootId) -> Result<Action> {
    let guard = ctx
        .locks
        .try_acquire(library.id)
        .or_raise(|| ErrorKind::ScanInProgress(library.id))?;
    let target_backend = library.root(target_root).ok_or_raise(|| ErrorKind::RootNotFound(target_root))?;
    let primary = book.primary_file().or(book.files.first()).ok_or_raise(|| ErrorKind::NoFiles)?;
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();

    let mut moves = Vec::new();
    let mut targets = HashSet::new();
    let mut primary_in_place = false;
    for file in &book.files {
        let backend = library.root(file.root_id).ok_or_raise(|| ErrorKind::RootNotFound(file.root_id))?;
        let source = file.path_key().relative_path().or_raise(|| ErrorKind::Storage)?;
        let target = PathBuf::from(ctx.template.generate(book, file).or_raise(|| ErrorKind::Template)?);
        if !targets.insert(target.clone()) {
            exn::bail!(ErrorKind::Conflict(target));
        }
        if file.root_id == target_root && source == target {
            primary_in_place |= file.id == primary.id;
            continue;
        }
        let (sub_path, file_name) = split_location(&target).or_raise(|| ErrorKind::Template)?;
        moves.push(Move {
            backend: Arc::clone(backend),
            folder_based: file.folder_based,
            staged: source.with_file_name(format!(".{}.{nanos}.{STAGED_SUFFIX}", file.file_name)),
            source,
            target,
            location: FileLocation {
                file_id: file.id,
                root_id: target_root,
                sub_path,
                file_name,
            },
            stage: Stage::Pending,
        });
    }
    if primary_in_place || moves.is_empty() {
        tracing::debug!("Book is already in place");
        return Ok(Action::AlreadyCorrect(book.id));
    }

    validate(book, &moves, target_backend, target_root).await?;

    let relocation = Relocation {
        catalog: ctx.catalog.clone(),
        watcher: Arc::clone(&ctx.watcher),
        library_id: library.id,
        watch: library.watch,
        drain: ctx.drain,
        target_backend: Arc::clone(target_backend),
        protected: library.root_paths(),
        moves,
        _guard: guard,
    };
    let files = tokio::spawn(relocation.run().in_current_span())
        .await
        .or_raise(|| ErrorKind::Interrupted)??;

    tracing::info!(files, "Relocated book");
    Ok(Action::Relocated { book_id: book.id, files })
}

async fn validate(book: &CatalogBook, moves: &[Move], target_backend: &BackendHandle, target_root: RootId) -> Result<()> {
    for m in moves {
        let expected = match m.folder_based {
            true => EntryKind::Directory,
            false => EntryKind::File,
        };
        match m.backend.kind(&m.source).await.or_raise(|| ErrorKind::Storage)? {
            Some(kind) if kind == expected => {},
            _ => exn::bail!(ErrorKind::SourceMissing(m.source.clone())),
        }
    }
    // Targets may only be occupied by the book's own files, which are about
    // to move out of the way.
    let own: HashSet<(RootId, PathBuf)> = book
        .files
        .iter()
        .filter_map(|file| file.path_key().relative_path().ok().map(|path| (file.root_id, path)))
        .collect();
    for m in moves {
        let occupied = target_backend.exists(&m.target).await.or_raise(|| ErrorKind::Storage)?;
        if occupied && !own.contains(&(target_root, m.target.clone())) {
            exn::bail!(ErrorKind::Conflict(m.target.clone()));
        }
    }
    Ok(())
}

/// The side-effecting half of a relocation. Owns everything it touches, the
/// library's scan lock included, so it can outlive its caller.
struct Relocation {
    catalog: Repository,
    watcher: Arc<dyn Watcher>,
    library_id: LibraryId,
    watch: bool,
    drain: Duration,
    target_backend: BackendHandle,
    protected: Vec<PathBuf>,
    moves: Vec<Move>,
    _guard: ScanGuard,
}
impl Relocation {
    /// Returns the number of files moved.
    async fn run(mut self) -> Result<usize> {
        if self.watch {
            self.watcher.unregister(self.library_id).await;
            let paths: Vec<PathBuf> = self.moves.iter().flat_map(|m| [m.source.clone(), m.target.clone()]).collect();
            self.watcher.wait_for_drain(&paths, self.drain).await;
        }
        let result = self.execute().await;
        if self.watch {
            self.watcher.register(self.library_id).await;
        }
        result.map(|()| self.moves.len())
    }

    async fn execute(&mut self) -> Result<()> {
        for i in 0..self.moves.len() {
            let staged = {
                let m = &self.moves[i];
                m.backend.rename(&m.source, &m.staged).await
            };
            match staged {
                Ok(()) => self.moves[i].stage = Stage::Staged,
                Err(e) => {
                    rollback(&self.target_backend, &mut self.moves, &self.protected).await;
                    return Err(e).or_raise(|| ErrorKind::Storage).or_raise(|| ErrorKind::Rollback);
                },
            }
        }

        for i in 0..self.moves.len() {
            let committed = {
                let m = &self.moves[i];
                transfer(&m.backend, &m.staged, &self.target_backend, &m.target).await
            };
            match committed {
                Ok(()) => self.moves[i].stage = Stage::Committed,
                Err(e) => {
                    rollback(&self.target_backend, &mut self.moves, &self.protected).await;
                    return Err(e).or_raise(|| ErrorKind::Storage).or_raise(|| ErrorKind::Rollback);
                },
            }
        }

        let locations: Vec<FileLocation> = self.moves.iter().map(|m| m.location.clone()).collect();
        if let Err(e) = self.catalog.update_file_locations(&locations).await {
            rollback(&self.target_backend, &mut self.moves, &self.protected).await;
            return Err(e).or_raise(|| ErrorKind::Catalog).or_raise(|| ErrorKind::Rollback);
        }

        for m in &self.moves {
            if let Some(dir) = parent(&m.source)
                && let Err(e) = m.backend.remove_empty_dirs(dir, &self.protected).await
            {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove emptied directory");
            }
        }
        Ok(())
    }
}

/// Best-effort: put every staged or committed file back at its source.
async fn rollback(target_backend: &BackendHandle, moves: &mut [Move], protected: &[PathBuf]) {
    for m in moves.iter_mut().rev() {
        let result = match m.stage {
            Stage::Committed => transfer(target_backend, &m.target, &m.backend, &m.source).await,
            Stage::Staged => m.backend.rename(&m.staged, &m.source).await,
            Stage::Pending => continue,
        };
        match result {
            Ok(()) => {
                if m.stage == Stage::Committed
                    && let Some(dir) = parent(&m.target)
                {
                    _ = target_backend.remove_empty_dirs(dir, protected).await;
                }
                m.stage = Stage::Pending;
            },
            Err(e) => tracing::error!(
                source = %m.source.display(),
                target = %m.target.display(),
                error = %e,
                "Failed to roll back move"
            ),
        }
    }
    tracing::warn!(files = moves.len(), "Relocation rolled back");
}
