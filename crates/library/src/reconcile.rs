//! Matching a fresh directory listing against the catalog.
//!
//! [`plan`] is pure: it decides, from what was discovered and what the
//! catalog holds, which files attach to existing books, which groups become
//! new books and which catalogued files have vanished. [`apply`] then carries
//! the plan out, one catalog transaction per effect, so a single failure
//! never undoes the rest of a scan.

use crate::Context;
use crate::group::{Keys, group_files};
use crate::library::Library;
use bindery_catalog::{BookId, CatalogBook, CatalogFile, FileId, NewBook, NewFile};
use bindery_config::GroupingStrategy;
use bindery_naming::{normalize_key, similarity};
use bindery_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
use bindery_storage::fingerprint::fingerprint;
use bindery_storage::{DiscoveredFile, PathKey, RootId};
use futures::StreamExt;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// A new file is attached to a placeholder book when its key is at least
/// this similar to the book's title.
const FILELESS_MATCH_THRESHOLD: f64 = 0.85;
/// A new file is attached to a book in the same folder when its key is at
/// least this similar to the book's primary file.
const FOLDER_MATCH_THRESHOLD: f64 = 0.85;
/// Files fingerprinted at once.
pub const MAX_FINGERPRINT_CONCURRENCY: usize = 16;

/// A new file for an existing book.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub book_id: BookId,
    pub file: DiscoveredFile,
    pub is_primary: bool,
}

/// Catalogued files of one book that are gone from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub book_id: BookId,
    pub file_ids: Vec<FileId>,
    /// Remaining file taking over as primary
    pub promote: Option<FileId>,
    /// Nothing is left of the book
    pub delete_book: bool,
    /// Every file vanished, but files attached in the same plan carry the
    /// book on. If none of them lands the book is deleted after all.
    pub carried: bool,
}

/// A catalogued file whose size changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Refresh {
    pub file_id: FileId,
    pub file: DiscoveredFile,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub attach: Vec<Attachment>,
    /// One entry per new book
    pub create: Vec<Vec<DiscoveredFile>>,
    pub remove: Vec<Removal>,
    pub refresh: Vec<Refresh>,
}
impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.attach.is_empty() && self.create.is_empty() && self.remove.is_empty() && self.refresh.is_empty()
    }
}

/// What [`apply`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub attached: usize,
    pub created_books: usize,
    pub created_files: usize,
    pub removed_files: usize,
    pub deleted_books: usize,
    pub promoted: usize,
    pub refreshed: usize,
    /// Files that could not be fingerprinted
    pub skipped: usize,
    /// Catalog operations that failed
    pub failures: usize,
}

/// A book with files in a folder, as a match target.
struct Candidate {
    book_id: BookId,
    keys: Keys,
}

/// Priority order of formats, then location: the best primary is the maximum.
fn primary_order(a: &DiscoveredFile, b: &DiscoveredFile) -> Ordering {
    a.format.priority().cmp(&b.format.priority()).then_with(|| b.cmp(a))
}

fn best_remaining<'a>(files: &[&'a CatalogFile]) -> Option<&'a CatalogFile> {
    files
        .iter()
        .copied()
        .max_by(|a, b| a.format.priority().cmp(&b.format.priority()).then_with(|| b.id.cmp(&a.id)))
}

/// Index of the best placeholder for `key`, if any is similar enough.
fn match_fileless(fileless: &[(BookId, String)], key: &str) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (_, title)) in fileless.iter().enumerate() {
        let score = similarity(title, key);
        if score >= FILELESS_MATCH_THRESHOLD && best.is_none_or(|(_, best)| score > best) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

fn match_in_folder(candidates: &[Candidate], keys: &Keys, strategy: GroupingStrategy, root_level: bool) -> Option<BookId> {
    let exact = || candidates.iter().find(|c| c.keys.key == keys.key).map(|c| c.book_id);
    // Loose files at the root of a library are unrelated until proven otherwise.
    if root_level {
        return exact();
    }
    match candidates {
        [] => None,
        [only] => Some(only.book_id),
        _ => match strategy {
            GroupingStrategy::BookPerFolder => exact(),
            GroupingStrategy::AutoDetect => {
                if let Some(candidate) = candidates.iter().find(|c| c.keys.stripped == keys.stripped) {
                    return Some(candidate.book_id);
                }
                let mut best: Option<(BookId, f64)> = None;
                for candidate in candidates {
                    let score = similarity(&candidate.keys.stripped, &keys.stripped);
                    if score >= FOLDER_MATCH_THRESHOLD && best.is_none_or(|(_, best)| score > best) {
                        best = Some((candidate.book_id, score));
                    }
                }
                best.map(|(book_id, _)| book_id)
            },
        },
    }
}

/// Decide what a scan changes.
///
/// `books` are the library's books (fileless ones are ignored here),
/// `fileless` its placeholders. Catalogued files on an `incomplete` root
/// (one that could not be walked completely) are never treated as vanished.
pub fn plan(
    discovered: &[DiscoveredFile],
    books: &[CatalogBook],
    fileless: &[CatalogBook],
    strategy: GroupingStrategy,
    incomplete: &HashSet<RootId>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut discovered = discovered.to_vec();
    discovered.sort();
    discovered.dedup_by(|a, b| a.path_key() == b.path_key());

    let books: Vec<&CatalogBook> = books.iter().filter(|book| book.has_files()).collect();
    let catalogued: HashMap<PathKey, &CatalogFile> = books
        .iter()
        .flat_map(|book| &book.files)
        .map(|file| (file.path_key(), file))
        .collect();
    let present: HashSet<PathKey> = discovered.iter().map(DiscoveredFile::path_key).collect();

    let mut folders: HashMap<(RootId, String), Vec<Candidate>> = HashMap::new();
    for book in &books {
        let Some(reference) = book.primary_file().or(book.files.first()) else {
            continue;
        };
        let mut seen = HashSet::new();
        for file in &book.files {
            if seen.insert((file.root_id, file.sub_path.as_str())) {
                folders.entry((file.root_id, file.sub_path.clone())).or_default().push(Candidate {
                    book_id: book.id,
                    keys: Keys::new(&reference.file_name),
                });
            }
        }
    }
    let mut fileless: Vec<(BookId, String)> = fileless
        .iter()
        .filter(|book| !book.has_files())
        .filter_map(|book| book.metadata.title.as_deref().map(|title| (book.id, normalize_key(title))))
        .collect();
    fileless.sort_by_key(|(book_id, _)| *book_id);

    let mut promoted = HashSet::new();
    let mut unmatched = Vec::new();
    for file in discovered {
        if let Some(existing) = catalogued.get(&file.path_key()) {
            if existing.size != file.size {
                plan.refresh.push(Refresh { file_id: existing.id, file });
            }
            continue;
        }
        let keys = Keys::new(&file.file_name);
        let folder = (file.root_id, file.sub_path.clone());
        if let Some(index) = match_fileless(&fileless, &keys.key) {
            let (book_id, _) = fileless.remove(index);
            tracing::debug!(book = book_id, file = %file.path_key(), "Promoting fileless book");
            promoted.insert(book_id);
            folders.entry(folder).or_default().push(Candidate { book_id, keys });
            plan.attach.push(Attachment { book_id, file, is_primary: false });
            continue;
        }
        let candidates = folders.get(&folder).map(Vec::as_slice).unwrap_or_default();
        match match_in_folder(candidates, &keys, strategy, file.is_root_level()) {
            Some(book_id) => plan.attach.push(Attachment { book_id, file, is_primary: false }),
            None => unmatched.push(file),
        }
    }
    plan.create = group_files(&unmatched, strategy).into_values().collect();

    let attached: HashSet<BookId> = plan.attach.iter().map(|a| a.book_id).collect();
    let mut needs_primary = promoted;
    for book in &books {
        let (vanished, remaining): (Vec<&CatalogFile>, Vec<&CatalogFile>) = book
            .files
            .iter()
            .partition(|file| !present.contains(&file.path_key()) && !incomplete.contains(&file.root_id));
        if vanished.is_empty() {
            continue;
        }
        let primary_vanished = vanished.iter().any(|file| file.is_primary);
        let carried = remaining.is_empty() && attached.contains(&book.id);
        if carried {
            // Everything moved or was renamed within the folder.
            needs_primary.insert(book.id);
        }
        plan.remove.push(Removal {
            book_id: book.id,
            file_ids: vanished.iter().map(|file| file.id).collect(),
            promote: primary_vanished.then(|| best_remaining(&remaining)).flatten().map(|file| file.id),
            delete_book: remaining.is_empty() && !carried,
            carried,
        });
    }

    for book_id in needs_primary {
        let best = plan
            .attach
            .iter_mut()
            .filter(|attachment| attachment.book_id == book_id)
            .max_by(|a, b| primary_order(&a.file, &b.file));
        if let Some(attachment) = best {
            attachment.is_primary = true;
        }
    }
    plan
}

async fn hash_file(library: &Library, file: &DiscoveredFile) -> StorageResult<String> {
    let Some(backend) = library.root(file.root_id) else {
        exn::bail!(StorageErrorKind::BackendError(format!("unknown root {}", file.root_id)));
    };
    let path = file.relative_path()?;
    fingerprint(&**backend, &path, file.folder_based).await
}

/// Fingerprint files concurrently. Failures are logged and left out.
async fn fingerprint_all(library: &Library, files: Vec<&DiscoveredFile>) -> HashMap<PathKey, String> {
    futures::stream::iter(files)
        .map(|file| async move { (file, hash_file(library, file).await) })
        .buffer_unordered(MAX_FINGERPRINT_CONCURRENCY)
        .filter_map(|(file, result)| async move {
            match result {
                Ok(hash) => Some((file.path_key(), hash)),
                Err(e) => {
                    tracing::warn!(file = %file.path_key(), error = %e, "Skipping file that could not be fingerprinted");
                    None
                },
            }
        })
        .collect()
        .await
}

/// Delete a book that has no files left, along with its cover. Returns
/// whether the book is gone.
async fn delete_book(ctx: &Context, book_id: BookId, report: &mut ReconcileReport) -> bool {
    match ctx.catalog.delete_book(book_id, ctx.soft_delete).await {
        Ok(()) => {
            tracing::info!(book = book_id, "Deleted book with no remaining files");
            report.deleted_books += 1;
            if let Some(covers) = &ctx.covers
                && let Err(e) = covers.remove(book_id).await
            {
                tracing::warn!(book = book_id, error = %e, "Failed to remove cover");
            }
            true
        },
        Err(e) => {
            tracing::warn!(book = book_id, error = %e, "Failed to delete book");
            report.failures += 1;
            false
        },
    }
}

/// Carry out a plan. Every effect is its own transaction; failures are logged
/// and counted, never propagated.
#[instrument(skip_all, fields(library = library.id))]
pub async fn apply(ctx: &Context, library: &Library, plan: ReconcilePlan) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let needed: Vec<&DiscoveredFile> = plan
        .attach
        .iter()
        .map(|attachment| &attachment.file)
        .chain(plan.create.iter().flatten())
        .chain(plan.refresh.iter().map(|refresh| &refresh.file))
        .collect();
    let wanted = needed.len();
    let hashes = fingerprint_all(library, needed).await;
    report.skipped = wanted - hashes.len();

    for refresh in &plan.refresh {
        let Some(hash) = hashes.get(&refresh.file.path_key()) else {
            continue;
        };
        match ctx.catalog.update_current_hash(refresh.file_id, hash, refresh.file.size).await {
            Ok(()) => report.refreshed += 1,
            Err(e) => {
                tracing::warn!(file = refresh.file_id, error = %e, "Failed to refresh fingerprint");
                report.failures += 1;
            },
        }
    }

    let mut deleted = HashSet::new();
    for removal in &plan.remove {
        let uncarried = removal.carried
            && !plan
                .attach
                .iter()
                .any(|a| a.book_id == removal.book_id && hashes.contains_key(&a.file.path_key()));
        if removal.delete_book || uncarried {
            if delete_book(ctx, removal.book_id, &mut report).await {
                report.removed_files += removal.file_ids.len();
                deleted.insert(removal.book_id);
            }
            continue;
        }
        match ctx.catalog.delete_files(removal.book_id, &removal.file_ids, removal.promote).await {
            Ok(()) => {
                report.removed_files += removal.file_ids.len();
                report.promoted += usize::from(removal.promote.is_some());
            },
            Err(e) => {
                tracing::warn!(book = removal.book_id, error = %e, "Failed to remove vanished files");
                report.failures += 1;
            },
        }
    }

    let mut landed = HashSet::new();
    for attachment in &plan.attach {
        let Some(hash) = hashes.get(&attachment.file.path_key()) else {
            continue;
        };
        if deleted.contains(&attachment.book_id) {
            continue;
        }
        let file = NewFile::from_discovered(&attachment.file, hash, attachment.is_primary);
        match ctx.catalog.attach_file(attachment.book_id, &file).await {
            Ok(_) => {
                report.attached += 1;
                landed.insert(attachment.book_id);
            },
            Err(e) => {
                tracing::warn!(book = attachment.book_id, file = %attachment.file.path_key(), error = %e, "Failed to attach file");
                report.failures += 1;
            },
        }
    }

    // Emptied books whose carrying files all failed to attach.
    for removal in plan.remove.iter().filter(|r| r.carried) {
        if !deleted.contains(&removal.book_id) && !landed.contains(&removal.book_id) {
            delete_book(ctx, removal.book_id, &mut report).await;
        }
    }

    for group in &plan.create {
        let members: Vec<(&DiscoveredFile, &String)> = group
            .iter()
            .filter_map(|file| hashes.get(&file.path_key()).map(|hash| (file, hash)))
            .collect();
        let Some((primary, _)) = members.iter().copied().max_by(|a, b| primary_order(a.0, b.0)) else {
            continue;
        };
        let Some(backend) = library.root(primary.root_id) else {
            continue;
        };
        let metadata = ctx.processors.metadata(&**backend, primary).await;
        let files: Vec<NewFile> = members
            .iter()
            .map(|(file, hash)| NewFile::from_discovered(file, hash.as_str(), std::ptr::eq(*file, primary)))
            .collect();
        let book = NewBook { library_id: library.id, metadata };
        let book = match ctx.catalog.create_book(&book, &files).await {
            Ok(book) => book,
            Err(e) => {
                tracing::warn!(file = %primary.path_key(), error = %e, "Failed to create book");
                report.failures += 1;
                continue;
            },
        };
        report.created_books += 1;
        report.created_files += files.len();
        if let Some(covers) = &ctx.covers {
            match ctx.processors.cover(&**backend, primary).await {
                Ok(Some(image)) => {
                    if let Err(e) = covers.store(book.id, &image).await {
                        tracing::warn!(book = book.id, error = %e, "Failed to store cover");
                    }
                },
                Ok(None) => {},
                Err(e) => tracing::warn!(book = book.id, error = %e, "Failed to generate cover"),
            }
        }
    }

    tracing::info!(
        attached = report.attached,
        created = report.created_books,
        removed = report.removed_files,
        deleted = report.deleted_books,
        refreshed = report.refreshed,
        skipped = report.skipped,
        failures = report.failures,
        "Reconciliation applied"
    );
    report
}
