//! The image pipeline: folder loading, background upgrades, previews and
//! package slots wired around shared caches and one decoder.
//!
//! Results reach the UI as events on two channels. Drain
//! [`Pipeline::grid_events`] into a [`ThumbnailGrid`](crate::models::ThumbnailGrid)
//! and [`Pipeline::preview_events`] into a
//! [`PreviewSlot`](crate::models::PreviewSlot).

pub mod folder_loader;
pub mod preview;
pub mod slots;

pub use folder_loader::{FolderLoader, LoadOutcome};
pub use preview::{PreviewError, PreviewGenerator};
pub use slots::{Category, SlotBoard};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use flume::Receiver;
use tracing::info;

use crate::cache::{FolderCache, PreviewCache};
use crate::config::PipelineConfig;
use crate::decode::BitmapDecoder;
use crate::image_loader::ImageLoader;
use crate::models::{GridEvent, ImageEntry, PreviewEvent};
use crate::scanner::FileScanner;
use crate::thumbnails::{DiskThumbnailCache, UpgradeQueue, UpgradeQueueBuilder};

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    decoder: Arc<BitmapDecoder>,
    folder_cache: Arc<FolderCache>,
    preview_cache: Arc<PreviewCache>,
    upgrades: Arc<UpgradeQueue>,
    folders: FolderLoader,
    previews: PreviewGenerator,
    slots: SlotBoard,
    grid_rx: Receiver<GridEvent>,
    preview_rx: Receiver<PreviewEvent>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let config = Arc::new(config);
        let decoder = Arc::new(BitmapDecoder::new());
        let disk = Arc::new(DiskThumbnailCache::from_config(&config));
        let loader = ImageLoader::new(Arc::clone(&decoder), disk);

        let folder_cache = Arc::new(FolderCache::new(config.folder_cache_capacity));
        let preview_cache = Arc::new(PreviewCache::new(config.preview_cache_capacity));

        let (grid_tx, grid_rx) = flume::unbounded();
        let (preview_tx, preview_rx) = flume::unbounded();

        let upgrades = Arc::new(
            UpgradeQueueBuilder::from_config(&config).build(loader.clone(), grid_tx.clone())?,
        );
        let previews = PreviewGenerator::new(
            Arc::clone(&decoder),
            Arc::clone(&preview_cache),
            config.preview_width,
            preview_tx,
        )?;
        let folders = FolderLoader::new(
            Arc::clone(&config),
            loader.clone(),
            FileScanner::new(),
            Arc::clone(&folder_cache),
            Arc::clone(&preview_cache),
            Arc::clone(&upgrades),
            grid_tx,
        );
        let slots = SlotBoard::new(loader, &config);

        info!(
            preview_cache = config.preview_cache_capacity,
            folder_cache = config.folder_cache_capacity,
            "Pipeline ready"
        );

        Ok(Self {
            config,
            decoder,
            folder_cache,
            preview_cache,
            upgrades,
            folders,
            previews,
            slots,
            grid_rx,
            preview_rx,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn grid_events(&self) -> &Receiver<GridEvent> {
        &self.grid_rx
    }

    pub fn preview_events(&self) -> &Receiver<PreviewEvent> {
        &self.preview_rx
    }

    /// Load `folder` on the calling thread, superseding any running load.
    pub fn load_folder(&self, folder: &Path) -> LoadOutcome {
        self.folders.load(folder)
    }

    pub async fn load_folder_async(&self, folder: PathBuf) -> LoadOutcome {
        self.folders.load_async(folder).await
    }

    /// Change the selected entry; `None` clears the preview.
    pub fn select(&self, entry: Option<Arc<ImageEntry>>) -> u64 {
        self.previews.select(entry)
    }

    /// Select `entry` and wait for its final preview.
    pub async fn preview_async(&self, entry: Arc<ImageEntry>) -> Result<Arc<ImageEntry>, PreviewError> {
        self.previews.preview(entry).await
    }

    pub fn assign_slot(&self, category: Category, source: &Arc<ImageEntry>) -> Arc<ImageEntry> {
        self.slots.assign(category, source)
    }

    pub fn slots(&self) -> &SlotBoard {
        &self.slots
    }

    pub async fn package_preview(
        &self,
        categories: Vec<Category>,
    ) -> Result<HashMap<Category, Arc<ImageEntry>>> {
        self.slots.package_preview(categories).await
    }

    /// Drop everything tied to the current order: running work, slots, the
    /// live preview and cached previews. Cached folders are kept.
    pub fn reset(&self) {
        self.folders.cancel();
        self.slots.clear_all();
        self.previews.select(None);
        self.preview_cache.clear();
        info!("Pipeline reset");
    }

    pub fn upgrades(&self) -> &UpgradeQueue {
        &self.upgrades
    }

    pub fn preview_cache(&self) -> &PreviewCache {
        &self.preview_cache
    }

    pub fn folder_cache(&self) -> &FolderCache {
        &self.folder_cache
    }

    pub fn decoder(&self) -> &BitmapDecoder {
        &self.decoder
    }

    pub fn decode_count(&self) -> u64 {
        self.decoder.decode_count()
    }
}
