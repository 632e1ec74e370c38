//! Shared fixtures for tests that need a real catalog and real roots.

use crate::{Context, Library};
use bindery_catalog::{Database, Repository};
use bindery_config::GroupingStrategy;
use bindery_storage::BackendHandle;
use bindery_storage::backend::LocalBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub(crate) temp_dir: TempDir,
    pub(crate) db: Database,
    pub(crate) ctx: Context,
    pub(crate) library: Library,
}
impl Fixture {
    pub(crate) fn root(&self) -> PathBuf {
        self.temp_dir.path().join("root")
    }

    pub(crate) fn write(&self, path: &str, len: usize) {
        write_file(&self.root(), path, len);
    }

    pub(crate) fn remove(&self, path: &str) {
        std::fs::remove_file(self.root().join(path)).unwrap();
    }

    pub(crate) fn exists(&self, path: &str) -> bool {
        self.root().join(path).exists()
    }
}

/// Distinct, deterministic contents per path.
pub(crate) fn write_file(root: &Path, path: &str, len: usize) {
    let absolute = root.join(path);
    std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
    let contents: Vec<u8> = path.bytes().cycle().take(len).collect();
    std::fs::write(absolute, contents).unwrap();
}

pub(crate) async fn fixture(files: &[&str], strategy: GroupingStrategy) -> Fixture {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("root");
    std::fs::create_dir_all(&root).unwrap();
    for path in files {
        write_file(&root, path, 4096);
    }
    let backend: BackendHandle = Arc::new(LocalBackend::new(1, &root).unwrap());
    fixture_with_roots(temp_dir, vec![backend], strategy).await
}

pub(crate) async fn fixture_with_roots(temp_dir: TempDir, roots: Vec<BackendHandle>, strategy: GroupingStrategy) -> Fixture {
    let db = Database::connect_in_memory().await.unwrap();
    let mut ctx = Context::new(Repository::from(&db)).unwrap();
    ctx.drain = Duration::from_millis(1);
    let library = Library::new(1, "Books", strategy, false, roots);
    Fixture { temp_dir, db, ctx, library }
}
