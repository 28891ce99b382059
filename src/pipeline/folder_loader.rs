//! Two-phase folder loading.
//!
//! 1. Every supported photo gets a grid entry straight away: the cached
//!    grid thumbnail when one exists on disk, otherwise a tiny placeholder.
//!    Entries are published in batches, in file name order.
//! 2. Placeholders are handed to the upgrade worker.
//!
//! A finished load is remembered in the folder cache, so browsing back to
//! the folder republishes the same entries without touching the decoder.
//! Starting a load cancels whatever load was running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flume::Sender;
use tokio::task;
use tracing::{debug, info, trace};

use crate::cache::{FolderCache, PreviewCache};
use crate::cancel::{CancelToken, LoadGeneration};
use crate::config::PipelineConfig;
use crate::decode::read_orientation;
use crate::image_loader::ImageLoader;
use crate::models::{GridEvent, ImageEntry, Tier};
use crate::scanner::FileScanner;
use crate::thumbnails::UpgradeQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Entries were produced from disk; `skipped` files failed to decode.
    Loaded { count: usize, skipped: usize },
    /// Entries came from the folder cache.
    CacheHit { count: usize },
    /// The folder is missing or holds no supported photos.
    NoImages,
    /// A newer load superseded this one.
    Cancelled,
}

#[derive(Clone)]
pub struct FolderLoader {
    config: Arc<PipelineConfig>,
    loader: ImageLoader,
    scanner: FileScanner,
    folder_cache: Arc<FolderCache>,
    preview_cache: Arc<PreviewCache>,
    upgrades: Arc<UpgradeQueue>,
    generation: LoadGeneration,
    events: Sender<GridEvent>,
}

impl FolderLoader {
    pub fn new(
        config: Arc<PipelineConfig>,
        loader: ImageLoader,
        scanner: FileScanner,
        folder_cache: Arc<FolderCache>,
        preview_cache: Arc<PreviewCache>,
        upgrades: Arc<UpgradeQueue>,
        events: Sender<GridEvent>,
    ) -> Self {
        Self {
            config,
            loader,
            scanner,
            folder_cache,
            preview_cache,
            upgrades,
            generation: LoadGeneration::new(),
            events,
        }
    }

    /// Cancel the running load, if any, without starting another.
    pub fn cancel(&self) {
        self.generation.cancel();
        self.upgrades.clear();
    }

    /// Load `folder` on the calling thread. Blocks on decoding, so callers
    /// on a UI thread should use [`load_async`](Self::load_async).
    pub fn load(&self, folder: &Path) -> LoadOutcome {
        let token = self.generation.begin();
        self.upgrades.clear();
        self.preview_cache.clear();
        self.send(GridEvent::Reset {
            generation: token.generation(),
            folder: folder.to_path_buf(),
        });
        debug!(?folder, generation = token.generation(), "Loading folder");

        if let Some(entries) = self.folder_cache.get(folder) {
            return self.republish(folder, &entries, &token);
        }

        let files = match self.scanner.discover(folder, &token) {
            Ok(Some(files)) => files,
            Ok(None) => {
                trace!(?folder, "Folder load superseded during discovery");
                return LoadOutcome::Cancelled;
            }
            Err(e) => {
                debug!(?folder, error = %e, "Folder not readable");
                Vec::new()
            }
        };
        if files.is_empty() {
            self.send(GridEvent::NoImages {
                generation: token.generation(),
            });
            info!(?folder, "No images in folder");
            return LoadOutcome::NoImages;
        }

        let batch_size = self.config.batch_size.max(1);
        let mut all = Vec::with_capacity(files.len());
        let mut batch = Vec::with_capacity(batch_size);
        let mut skipped = 0;

        for path in &files {
            if token.is_cancelled() {
                trace!(?folder, "Folder load superseded");
                return LoadOutcome::Cancelled;
            }
            match self.grid_entry(path) {
                Some(entry) => batch.push(entry),
                None => skipped += 1,
            }
            if batch.len() >= batch_size {
                self.publish(&token, &mut batch, &mut all);
            }
        }

        if token.is_cancelled() {
            trace!(?folder, "Folder load superseded");
            return LoadOutcome::Cancelled;
        }
        if !batch.is_empty() {
            self.publish(&token, &mut batch, &mut all);
        }

        let count = all.len();
        self.folder_cache.put(folder.to_path_buf(), all);
        self.send(GridEvent::Completed {
            generation: token.generation(),
            total: count,
            from_cache: false,
        });
        info!(?folder, count, skipped, "Folder loaded");
        LoadOutcome::Loaded { count, skipped }
    }

    /// [`load`](Self::load) on the blocking pool.
    pub async fn load_async(&self, folder: PathBuf) -> LoadOutcome {
        let this = self.clone();
        match task::spawn_blocking(move || this.load(&folder)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(error = %e, "Folder load task failed");
                LoadOutcome::Cancelled
            }
        }
    }

    fn republish(
        &self,
        folder: &Path,
        entries: &[Arc<ImageEntry>],
        token: &CancelToken,
    ) -> LoadOutcome {
        self.send(GridEvent::Batch {
            generation: token.generation(),
            entries: entries.to_vec(),
        });

        // Entries cached before their upgrade finished still need one.
        let mut requeued = 0;
        for entry in entries.iter().filter(|e| e.tier() == Tier::Placeholder) {
            self.upgrades.enqueue(Arc::clone(entry), token.clone());
            requeued += 1;
        }

        self.send(GridEvent::Completed {
            generation: token.generation(),
            total: entries.len(),
            from_cache: true,
        });
        info!(?folder, count = entries.len(), requeued, "Folder served from cache");
        LoadOutcome::CacheHit {
            count: entries.len(),
        }
    }

    /// Cached grid thumbnail if present, otherwise a fresh placeholder.
    /// `None` means the file could not be decoded.
    fn grid_entry(&self, path: &Path) -> Option<Arc<ImageEntry>> {
        let rotation = read_orientation(path);

        if let Some(img) = self.loader.cached(path, self.config.grid_width) {
            return Some(Arc::new(ImageEntry::new(path, img, Tier::Grid, rotation)));
        }

        match self
            .loader
            .load(path, self.config.placeholder_width, rotation)
        {
            Ok(img) => Some(Arc::new(ImageEntry::new(
                path,
                img,
                Tier::Placeholder,
                rotation,
            ))),
            Err(e) => {
                debug!(?path, error = %e, "Skipping undecodable file");
                None
            }
        }
    }

    fn publish(
        &self,
        token: &CancelToken,
        batch: &mut Vec<Arc<ImageEntry>>,
        all: &mut Vec<Arc<ImageEntry>>,
    ) {
        let entries = std::mem::take(batch);
        trace!(count = entries.len(), "Publishing batch");
        self.send(GridEvent::Batch {
            generation: token.generation(),
            entries: entries.clone(),
        });
        for entry in &entries {
            if entry.tier() == Tier::Placeholder {
                self.upgrades.enqueue(Arc::clone(entry), token.clone());
            }
        }
        all.extend(entries);
    }

    fn send(&self, event: GridEvent) {
        let _ = self.events.send(event);
    }
}
