use crate::error::{ErrorKind, Result};
use bindery_catalog::LibraryId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Libraries currently being scanned.
///
/// Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct ScanLocks {
    active: Arc<Mutex<HashSet<LibraryId>>>,
}
impl ScanLocks {
    fn active(&self) -> MutexGuard<'_, HashSet<LibraryId>> {
        // The set stays consistent even if a holder panicked.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a library for scanning.
    ///
    /// Fails with [`ErrorKind::ScanInProgress`] if it is already claimed.
    pub fn try_acquire(&self, library_id: LibraryId) -> Result<ScanGuard> {
        if !self.active().insert(library_id) {
            exn::bail!(ErrorKind::ScanInProgress(library_id));
        }
        Ok(ScanGuard {
            library_id,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_scanning(&self, library_id: LibraryId) -> bool {
        self.active().contains(&library_id)
    }
}

/// Releases its library when dropped.
#[derive(Debug)]
pub struct ScanGuard {
    library_id: LibraryId,
    active: Arc<Mutex<HashSet<LibraryId>>>,
}
impl ScanGuard {
    pub fn library_id(&self) -> LibraryId {
        self.library_id
    }
}
impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.library_id);
    }
}
