//! Local filesystem storage backend.
//!
//! A library root is a directory on the local filesystem, accessed through
//! `tokio::fs` for async I/O.

use crate::backend::EntryStream;
use crate::error::{ErrorKind, Result};
use crate::{Entry, EntryKind, RootId, StorageBackend, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::Metadata;
use std::io::{ErrorKind as IoErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

enum WalkEntry {
    File(Entry),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use bindery_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new(1, "/srv/books")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    root_id: RootId,
    /// Root directory of the library
    root: PathBuf,
}
impl LocalBackend {
    /// Create a backend for an existing or future root directory.
    ///
    /// The root is not created: a missing root is reported by
    /// [`check_root()`](StorageBackend::check_root) so that scans can abort
    /// rather than catalogue an empty library.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the path is not
    /// absolute.
    pub fn new(root_id: RootId, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { root_id, root })
    }

    /// Convert an absolute path back to a root-relative path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn entry(path: PathBuf, metadata: &Metadata) -> Result<Entry> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        let (kind, size) = match metadata.is_dir() {
            true => (EntryKind::Directory, 0),
            false => (EntryKind::File, metadata.len()),
        };
        Ok(Entry { path, kind, size, modified })
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            IoErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            IoErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            IoErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry.file_name().as_encoded_bytes().starts_with(b".")
    }

    /// Keeps the `?` operator usable for the body of the walk; the stream
    /// loop itself can only yield.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        if Self::is_hidden(&entry) {
            return Ok(WalkEntry::Skip);
        }
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // Descend if the prefix may still match something underneath.
            return match prefix {
                Some(pfx) if !relative.starts_with(pfx) && !pfx.starts_with(&relative) => Ok(WalkEntry::Skip),
                _ => Ok(WalkEntry::Descend(path)),
            };
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::entry(relative, &metadata)?));
        }
        // Broken symlinks, sockets and the like.
        Ok(WalkEntry::Skip)
    }

    /// Refuse to clobber whatever already lives at the destination, then make
    /// room for it.
    async fn prepare_destination(&self, to: &Path) -> Result<PathBuf> {
        let to_path = self.absolute_path(to)?;
        if fs::try_exists(&to_path).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::AlreadyExists(to.to_path_buf()));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, to))?;
        }
        Ok(to_path)
    }

    /// Copy `from` to the freshly prepared `to_path`. A copy that fails
    /// part-way leaves nothing behind at `to_path`.
    async fn copy_or_clean(from: &Path, to_path: &Path) -> std::io::Result<()> {
        let Err(e) = fs::copy(from, to_path).await else {
            return Ok(());
        };
        if let Err(cleanup) = fs::remove_file(to_path).await
            && cleanup.kind() != IoErrorKind::NotFound
        {
            tracing::warn!(path = %to_path.display(), error = %cleanup, "Failed to remove partial copy");
        }
        Err(e)
    }

    async fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
        let mut entries = fs::read_dir(path).await?;
        Ok(entries.next_entry().await?.is_none())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn root_id(&self) -> RootId {
        self.root_id
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn check_root(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| Self::map_io_error(e, &self.root))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::UnexpectedKind(self.root.clone()));
        }
        Ok(())
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> EntryStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Listing a directory that doesn't exist is an empty
                    // listing, not an error.
                    Err(err) if err.kind() == IoErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn list_dir(&self, path: Option<&Path>) -> Result<Vec<Entry>> {
        let dir = match path {
            Some(path) => self.absolute_path(path)?,
            None => self.root.clone(),
        };
        let display = path.unwrap_or(&self.root);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| Self::map_io_error(e, display))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, display))? {
            if Self::is_hidden(&entry) {
                continue;
            }
            let absolute = entry.path();
            let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &absolute))?;
            if !metadata.is_file() && !metadata.is_dir() {
                continue;
            }
            children.push(Self::entry(self.relative_path(&absolute)?, &metadata)?);
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        let abs_path = self.absolute_path(path)?;
        match fs::metadata(&abs_path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(metadata) if metadata.is_file() => Ok(Some(EntryKind::File)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e, path).into()),
        }
    }

    async fn stat(&self, path: &Path) -> Result<Entry> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Self::entry(validate_path(path)?, &metadata)
    }

    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        let mut file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        file.seek(SeekFrom::Start(offset)).await.map_err(ErrorKind::Io)?;
        let mut buffer = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from)?;
        if !fs::try_exists(&from_path).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::NotFound(from.to_path_buf()));
        }
        let to_path = self.prepare_destination(to).await?;
        Ok(fs::rename(&from_path, &to_path).await.map_err(|e| Self::map_io_error(e, to))?)
    }

    async fn adopt(&self, from_absolute: &Path, to: &Path) -> Result<()> {
        if !from_absolute.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(from_absolute.to_path_buf()));
        }
        let metadata = fs::metadata(from_absolute)
            .await
            .map_err(|e| Self::map_io_error(e, from_absolute))?;
        let to_path = self.prepare_destination(to).await?;
        match fs::rename(from_absolute, &to_path).await {
            Ok(()) => Ok(()),
            // Roots on different filesystems: regular files can be copied
            // across, directories cannot.
            Err(e) if e.kind() == IoErrorKind::CrossesDevices && metadata.is_file() => {
                tracing::debug!(from = %from_absolute.display(), to = %to_path.display(), "Copying across filesystems");
                Self::copy_or_clean(from_absolute, &to_path).await.map_err(|e| Self::map_io_error(e, to))?;
                Ok(fs::remove_file(from_absolute)
                    .await
                    .map_err(|e| Self::map_io_error(e, from_absolute))?)
            },
            Err(e) => Err(Self::map_io_error(e, to).into()),
        }
    }

    fn absolute_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }

    async fn remove_empty_dirs(&self, dir: &Path, protected: &[PathBuf]) -> Result<()> {
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        let mut current = validate_path(dir)?;
        loop {
            let absolute = self.root.join(&current);
            if protected.iter().any(|p| p == &absolute) {
                break;
            }
            match Self::is_empty_dir(&absolute).await {
                Ok(true) => {
                    fs::remove_dir(&absolute).await.map_err(|e| Self::map_io_error(e, &current))?;
                    tracing::debug!(root = self.root_id, dir = %current.display(), "Removed empty directory");
                },
                Ok(false) => break,
                // Already gone; its parent may still be empty.
                Err(e) if e.kind() == IoErrorKind::NotFound => {},
                Err(e) => exn::bail!(Self::map_io_error(e, &current)),
            }
            match current.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => current = parent.to_path_buf(),
                _ => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &[u8])]) -> (TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        for (path, data) in files {
            let absolute = temp_dir.path().join(path);
            std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
            std::fs::write(absolute, data).unwrap();
        }
        let backend = LocalBackend::new(1, temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_no_partial_target() {
        // The existing bytes stand in for a copy that died part-way.
        let (temp_dir, _backend) = setup(&[("Books/Silo.epub", b"half a bo")]);
        let to_path = temp_dir.path().join("Books/Silo.epub");
        let unreadable = temp_dir.path().join("Silo");
        std::fs::create_dir_all(&unreadable).unwrap();
        assert!(LocalBackend::copy_or_clean(&unreadable, &to_path).await.is_err());
        assert!(!to_path.exists());

        let source = temp_dir.path().join("Silo.epub");
        std::fs::write(&source, b"whole book").unwrap();
        LocalBackend::copy_or_clean(&source, &to_path).await.unwrap();
        assert_eq!(std::fs::read(&to_path).unwrap(), b"whole book");
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new(1, temp_dir.path()).is_ok());
        assert!(LocalBackend::new(1, "relative/path").is_err());
        assert!(LocalBackend::new(1, "./relative").is_err());
    }

    #[test]
    fn test_absolute_and_relative_path() {
        let (temp_dir, backend) = setup(&[]);
        let expected = temp_dir.path().join("Silo/Silo.epub");
        assert_eq!(backend.absolute_path(Path::new("Silo/Silo.epub")).unwrap(), expected);
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("Silo/Silo.epub"));
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
        assert!(backend.relative_path("/other/file.epub").is_err());
    }

    #[tokio::test]
    async fn test_check_root() {
        let (temp_dir, backend) = setup(&[]);
        backend.check_root().await.unwrap();
        let missing = LocalBackend::new(2, temp_dir.path().join("unmounted")).unwrap();
        let err = missing.check_root().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_skips_hidden_entries() {
        let (_temp_dir, backend) = setup(&[
            ("Dune.epub", b"data"),
            ("Silo/Silo.epub", b"data"),
            (".DS_Store", b"data"),
            ("Silo/.Silo.m4b.123.bindery-staged", b"data"),
            (".trash/Old.epub", b"data"),
        ]);
        let mut paths: Vec<_> = backend.list(None).await.unwrap().into_iter().map(|e| e.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("Dune.epub"), PathBuf::from("Silo/Silo.epub")]);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_temp_dir, backend) = setup(&[
            ("Howey/Silo/Silo.epub", b"data"),
            ("Howey/Silo/Shift.epub", b"data"),
            ("Howey/Silos/Dust.epub", b"data"),
            ("Weir/Artemis.epub", b"data"),
        ]);
        let files = backend.list(Some(Path::new("Howey/Silo"))).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.path.starts_with("Howey/Silo")));
        assert!(backend.list(Some(Path::new("nonexistent/"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_dir() {
        let (_temp_dir, backend) = setup(&[
            ("Book/02.mp3", b"two"),
            ("Book/01.mp3", b"one"),
            ("Book/Extras/notes.txt", b""),
            ("Book/.hidden.mp3", b""),
        ]);
        let children = backend.list_dir(Some(Path::new("Book"))).await.unwrap();
        let names: Vec<_> = children.iter().filter_map(Entry::name).collect();
        assert_eq!(names, vec!["01.mp3", "02.mp3", "Extras"]);
        assert!(children[2].is_dir());
        assert_eq!(children[0].size, 3);
        let root = backend.list_dir(None).await.unwrap();
        assert_eq!(root.len(), 1);
    }

    #[tokio::test]
    async fn test_kind_and_stat() {
        let (_temp_dir, backend) = setup(&[("Silo/Silo.epub", b"Hello, world!")]);
        assert_eq!(backend.kind(Path::new("Silo")).await.unwrap(), Some(EntryKind::Directory));
        assert_eq!(backend.kind(Path::new("Silo/Silo.epub")).await.unwrap(), Some(EntryKind::File));
        assert_eq!(backend.kind(Path::new("Wool.epub")).await.unwrap(), None);
        let entry = backend.stat(Path::new("Silo/Silo.epub")).await.unwrap();
        assert_eq!(entry.path, PathBuf::from("Silo/Silo.epub"));
        assert_eq!(entry.size, 13);
        let err = backend.stat(Path::new("Wool.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_at() {
        let (_temp_dir, backend) = setup(&[("file.epub", b"0123456789ABCDEF")]);
        let path = Path::new("file.epub");
        assert_eq!(backend.read_at(path, 0, 5).await.unwrap(), b"01234");
        assert_eq!(backend.read_at(path, 10, 100).await.unwrap(), b"ABCDEF");
        assert!(backend.read_at(path, 64, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_creates_directories() {
        let (_temp_dir, backend) = setup(&[("Silo.epub", b"data")]);
        backend.rename(Path::new("Silo.epub"), Path::new("Howey/Silo/Silo.epub")).await.unwrap();
        assert!(!backend.exists(Path::new("Silo.epub")).await.unwrap());
        assert!(backend.exists(Path::new("Howey/Silo/Silo.epub")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_never_overwrites() {
        let (_temp_dir, backend) = setup(&[("a.epub", b"a"), ("b.epub", b"b")]);
        let err = backend.rename(Path::new("a.epub"), Path::new("b.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(backend.read_at(Path::new("b.epub"), 0, 10).await.unwrap(), b"b");
        let err = backend.rename(Path::new("missing.epub"), Path::new("c.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_adopt_moves_between_roots() {
        let (source_dir, _source) = setup(&[("Book/01.mp3", b"one"), ("Book/02.mp3", b"two")]);
        let (_target_dir, target) = setup(&[]);
        let from = source_dir.path().join("Book");
        target.adopt(&from, Path::new("Audio/Book")).await.unwrap();
        assert!(!from.exists());
        assert_eq!(target.kind(Path::new("Audio/Book")).await.unwrap(), Some(EntryKind::Directory));
        assert!(target.adopt(Path::new("relative"), Path::new("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_empty_dirs() {
        let (temp_dir, backend) = setup(&[("Howey/Wool.epub", b"data")]);
        std::fs::create_dir_all(temp_dir.path().join("Howey/Silo/Extras")).unwrap();
        backend.remove_empty_dirs(Path::new("Howey/Silo/Extras"), &[]).await.unwrap();
        // Stops at the first non-empty directory.
        assert!(!temp_dir.path().join("Howey/Silo").exists());
        assert!(temp_dir.path().join("Howey").exists());
        // Never removes the root itself.
        std::fs::remove_file(temp_dir.path().join("Howey/Wool.epub")).unwrap();
        backend.remove_empty_dirs(Path::new("Howey"), &[]).await.unwrap();
        assert!(!temp_dir.path().join("Howey").exists());
        assert!(temp_dir.path().exists());
    }

    #[tokio::test]
    async fn test_remove_empty_dirs_respects_protected() {
        let (temp_dir, backend) = setup(&[]);
        let nested_root = temp_dir.path().join("Audiobooks");
        std::fs::create_dir_all(nested_root.join("Empty")).unwrap();
        backend.remove_empty_dirs(Path::new("Audiobooks/Empty"), &[nested_root.clone()]).await.unwrap();
        assert!(!nested_root.join("Empty").exists());
        assert!(nested_root.exists());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = setup(&[]);
        assert!(backend.read_at(Path::new("../etc/passwd"), 0, 10).await.is_err());
        assert!(backend.stat(Path::new("etc/../../passwd")).await.is_err());
        assert!(backend.rename(Path::new("../a"), Path::new("b")).await.is_err());
        assert!(backend.remove_empty_dirs(Path::new("../../tmp"), &[]).await.is_err());
    }
}
