use crate::error::{ErrorKind, Result};
use bindery_catalog::LibraryId;
use bindery_config::{GroupingStrategy, LibraryConfig};
use bindery_storage::backend::LocalBackend;
use bindery_storage::{BackendHandle, RootId};
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;

/// A configured library and a storage backend for each of its roots.
#[derive(Clone)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub strategy: GroupingStrategy,
    /// Whether a filesystem watcher observes this library
    pub watch: bool,
    roots: Vec<BackendHandle>,
}
impl Library {
    pub fn new(
        id: LibraryId,
        name: impl Into<String>,
        strategy: GroupingStrategy,
        watch: bool,
        roots: Vec<BackendHandle>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            strategy,
            watch,
            roots,
        }
    }

    /// Local-filesystem library. Roots are not required to exist yet; a scan
    /// checks them.
    pub fn from_config(config: &LibraryConfig) -> Result<Self> {
        let roots = config
            .roots
            .iter()
            .map(|root| {
                LocalBackend::new(root.id, &root.path)
                    .map(|backend| Arc::new(backend) as BackendHandle)
                    .or_raise(|| ErrorKind::Config)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(config.id, &config.name, config.strategy, config.watch, roots))
    }

    pub fn roots(&self) -> &[BackendHandle] {
        &self.roots
    }

    pub fn root(&self, root_id: RootId) -> Option<&BackendHandle> {
        self.roots.iter().find(|root| root.root_id() == root_id)
    }

    /// Absolute locations of every root. Roots may be nested inside each
    /// other, so none of these may be pruned as "empty" directories.
    pub fn root_paths(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|root| root.root().to_path_buf()).collect()
    }
}
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("watch", &self.watch)
            .field("roots", &self.root_paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_config::RootConfig;

    #[test]
    fn test_from_config() {
        let config = LibraryConfig {
            id: 3,
            name: "Books".to_string(),
            strategy: GroupingStrategy::BookPerFolder,
            watch: true,
            roots: vec![
                RootConfig { id: 30, path: PathBuf::from("/srv/books") },
                RootConfig { id: 31, path: PathBuf::from("/srv/more-books") },
            ],
        };
        let library = Library::from_config(&config).unwrap();
        assert_eq!(library.id, 3);
        assert_eq!(library.strategy, GroupingStrategy::BookPerFolder);
        assert!(library.watch);
        assert_eq!(library.root(31).unwrap().root(), PathBuf::from("/srv/more-books"));
        assert!(library.root(32).is_none());
        assert_eq!(library.root_paths().len(), 2);
    }

    #[test]
    fn test_relative_root_is_rejected() {
        let config = LibraryConfig {
            id: 3,
            name: "Books".to_string(),
            strategy: GroupingStrategy::default(),
            watch: false,
            roots: vec![RootConfig { id: 30, path: PathBuf::from("books") }],
        };
        let err = Library::from_config(&config).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Config));
    }
}
