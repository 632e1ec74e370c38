//! Coordination with a filesystem watcher.
//!
//! Event delivery lives outside this crate. Relocation only needs to switch a
//! library's watch off while it moves files, give in-flight events a moment
//! to settle, and switch it back on afterwards.

use async_trait::async_trait;
use bindery_catalog::LibraryId;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait Watcher: Send + Sync {
    /// Stop reacting to changes in a library.
    async fn unregister(&self, library_id: LibraryId);

    /// Resume reacting to changes in a library.
    async fn register(&self, library_id: LibraryId);

    /// Wait, at most `timeout`, for events concerning `paths` to be flushed.
    async fn wait_for_drain(&self, paths: &[PathBuf], timeout: Duration);
}

/// In-process watcher registration.
///
/// Tracks which libraries are registered. It has no event queue of its own,
/// so draining is a plain sleep for the whole timeout.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watching: RwLock<HashSet<LibraryId>>,
}
impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_watching(&self, library_id: LibraryId) -> bool {
        self.watching.read().await.contains(&library_id)
    }
}

#[async_trait]
impl Watcher for WatchRegistry {
    async fn unregister(&self, library_id: LibraryId) {
        if self.watching.write().await.remove(&library_id) {
            tracing::debug!(library = library_id, "Watcher unregistered");
        }
    }

    async fn register(&self, library_id: LibraryId) {
        if self.watching.write().await.insert(library_id) {
            tracing::debug!(library = library_id, "Watcher registered");
        }
    }

    async fn wait_for_drain(&self, paths: &[PathBuf], timeout: Duration) {
        tracing::trace!(paths = paths.len(), ?timeout, "Draining watcher events");
        tokio::time::sleep(timeout).await;
    }
}

/// For setups without a watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWatcher;

#[async_trait]
impl Watcher for NoopWatcher {
    async fn unregister(&self, _library_id: LibraryId) {}

    async fn register(&self, _library_id: LibraryId) {}

    async fn wait_for_drain(&self, _paths: &[PathBuf], _timeout: Duration) {}
}
