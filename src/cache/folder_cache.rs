//! LRU cache of finished folder loads for instant re-browsing.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::models::ImageEntry;

pub type FolderEntries = Arc<Vec<Arc<ImageEntry>>>;

pub struct FolderCache {
    folders: Mutex<LruCache<PathBuf, FolderEntries>>,
}

impl FolderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            folders: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Entries for `folder`, promoted to most recently used.
    pub fn get(&self, folder: &Path) -> Option<FolderEntries> {
        self.folders.lock().get(folder).cloned()
    }

    /// Store the entries of a finished load. Returns the folder that was
    /// evicted to make room; its entries are released with it.
    pub fn put(&self, folder: PathBuf, entries: Vec<Arc<ImageEntry>>) -> Option<PathBuf> {
        let evicted = self.folders.lock().push(folder.clone(), Arc::new(entries));
        match evicted {
            Some((key, _)) if key != folder => {
                debug!(evicted = ?key, "Evicted folder from cache");
                Some(key)
            }
            _ => None,
        }
    }

    pub fn contains(&self, folder: &Path) -> bool {
        self.folders.lock().contains(folder)
    }

    pub fn clear(&self) {
        self.folders.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.folders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
