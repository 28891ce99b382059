//! LRU cache of sharpened previews.
//!
//! The entry backing the preview currently on screen is pinned: when the
//! cache overflows, the least recently used *unpinned* entry goes instead.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::models::ImageEntry;

struct Inner {
    entries: LruCache<PathBuf, Arc<ImageEntry>>,
    pinned: Option<PathBuf>,
}

/// Thread-safe preview cache keyed by source path.
pub struct PreviewCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
}

impl PreviewCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                pinned: None,
            }),
            capacity,
        }
    }

    /// Cached preview for `path`, promoted to most recently used.
    pub fn get(&self, path: &Path) -> Option<Arc<ImageEntry>> {
        self.inner.lock().entries.get(path).cloned()
    }

    /// Insert a preview. A path already present is only promoted; the
    /// existing entry is kept. Returns the evicted entry, if any.
    pub fn put(&self, path: PathBuf, entry: Arc<ImageEntry>) -> Option<Arc<ImageEntry>> {
        let mut inner = self.inner.lock();
        if inner.entries.get(&path).is_some() {
            trace!(?path, "Preview already cached");
            return None;
        }

        let evicted = if inner.entries.len() >= self.capacity.get() {
            Self::evict_one(&mut inner)
        } else {
            None
        };
        inner.entries.put(path, entry);
        evicted
    }

    /// Drop the least recently used entry that is not pinned. When every
    /// entry is pinned the pinned one goes; its owner still holds a handle.
    fn evict_one(inner: &mut Inner) -> Option<Arc<ImageEntry>> {
        let victim = inner
            .entries
            .iter()
            .rev()
            .map(|(key, _)| key)
            .find(|key| inner.pinned.as_ref() != Some(*key))
            .cloned();

        let (key, entry) = match victim {
            Some(key) => {
                let entry = inner.entries.pop(&key)?;
                (key, entry)
            }
            None => inner.entries.pop_lru()?,
        };
        trace!(?key, "Evicted preview");
        Some(entry)
    }

    /// Mark the entry for `path` as the one on screen, or clear the mark.
    pub fn pin(&self, path: Option<&Path>) {
        self.inner.lock().pinned = path.map(Path::to_path_buf);
    }

    pub fn pinned(&self) -> Option<PathBuf> {
        self.inner.lock().pinned.clone()
    }

    /// Empty the cache. A pinned preview stays alive through the handle its
    /// viewer holds, and stays pinned if it is inserted again.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().entries.contains(path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}
