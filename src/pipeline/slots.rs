//! Print package slots.
//!
//! Each category holds at most one photo, kept as its own slot-sized copy so
//! the grid and preview tiers stay untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::task;
use tracing::{debug, trace};

use crate::config::PipelineConfig;
use crate::image_loader::ImageLoader;
use crate::models::{ImageEntry, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    EightByTen,
    Barong,
    Creative,
    Any,
    Instax,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::EightByTen,
        Category::Barong,
        Category::Creative,
        Category::Any,
        Category::Instax,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::EightByTen => "8x10",
            Self::Barong => "Barong",
            Self::Creative => "Creative",
            Self::Any => "Any",
            Self::Instax => "Instax",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub struct SlotBoard {
    loader: ImageLoader,
    slot_width: u32,
    package_width: u32,
    slots: Arc<Mutex<HashMap<Category, Arc<ImageEntry>>>>,
}

impl SlotBoard {
    pub fn new(loader: ImageLoader, config: &PipelineConfig) -> Self {
        Self {
            loader,
            slot_width: config.slot_width,
            package_width: config.package_preview_width,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Put `source` into `category`, replacing the previous occupant. A
    /// slot-sized copy is decoded; if that fails the slot shares `source`.
    pub fn assign(&self, category: Category, source: &Arc<ImageEntry>) -> Arc<ImageEntry> {
        self.clear(category);

        let path = source.path();
        let entry = match self.loader.load(path, self.slot_width, source.rotation()) {
            Ok(img) => Arc::new(ImageEntry::new(path, img, Tier::Slot, source.rotation())),
            Err(e) => {
                debug!(?path, %category, error = %e, "Slot decode failed, sharing source");
                Arc::clone(source)
            }
        };

        self.slots.lock().insert(category, Arc::clone(&entry));
        debug!(?path, %category, "Slot assigned");
        entry
    }

    pub fn get(&self, category: Category) -> Option<Arc<ImageEntry>> {
        self.slots.lock().get(&category).cloned()
    }

    pub fn clear(&self, category: Category) -> Option<Arc<ImageEntry>> {
        let removed = self.slots.lock().remove(&category);
        if removed.is_some() {
            trace!(%category, "Slot cleared");
        }
        removed
    }

    pub fn clear_all(&self) {
        self.slots.lock().clear();
    }

    /// Occupied categories, in board order.
    pub fn occupied(&self) -> Vec<Category> {
        let slots = self.slots.lock();
        Category::ALL
            .into_iter()
            .filter(|c| slots.contains_key(c))
            .collect()
    }

    /// Package-sized copies of the requested slots. Empty slots and slots
    /// whose source no longer decodes are left out.
    pub fn render_package_preview(&self, categories: &[Category]) -> HashMap<Category, Arc<ImageEntry>> {
        let mut rendered = HashMap::new();
        for &category in categories {
            let Some(entry) = self.get(category) else {
                continue;
            };
            let path = entry.path();
            match self.loader.load(path, self.package_width, entry.rotation()) {
                Ok(img) => {
                    let copy = ImageEntry::new(path, img, Tier::PackagePreview, entry.rotation());
                    rendered.insert(category, Arc::new(copy));
                }
                Err(e) => {
                    debug!(?path, %category, error = %e, "Package preview decode failed");
                }
            }
        }
        debug!(requested = categories.len(), rendered = rendered.len(), "Package preview ready");
        rendered
    }

    /// [`render_package_preview`](Self::render_package_preview) on the
    /// blocking pool.
    pub async fn package_preview(
        &self,
        categories: Vec<Category>,
    ) -> Result<HashMap<Category, Arc<ImageEntry>>> {
        let board = self.clone();
        task::spawn_blocking(move || board.render_package_preview(&categories))
            .await
            .context("Package preview task panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::BitmapDecoder;
    use crate::models::Rotation;
    use crate::test_util::write_jpeg;
    use crate::thumbnails::DiskThumbnailCache;
    use image::RgbaImage;
    use std::path::Path;
    use tempfile::tempdir;

    fn board() -> SlotBoard {
        let config = PipelineConfig::default();
        let loader = ImageLoader::new(
            Arc::new(BitmapDecoder::new()),
            Arc::new(DiskThumbnailCache::from_config(&config)),
        );
        SlotBoard::new(loader, &config)
    }

    fn grid_entry(path: &Path) -> Arc<ImageEntry> {
        Arc::new(ImageEntry::new(
            path,
            RgbaImage::new(150, 100),
            Tier::Grid,
            Rotation::None,
        ))
    }

    #[test]
    fn test_category_labels() {
        let labels: Vec<_> = Category::ALL.iter().map(|c| c.to_string()).collect();
        assert_eq!(labels, vec!["8x10", "Barong", "Creative", "Any", "Instax"]);
    }

    #[test]
    fn test_assign_loads_slot_copy() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 900, 600);
        let board = board();
        let source = grid_entry(&path);

        let slot = board.assign(Category::Barong, &source);
        assert_eq!(slot.tier(), Tier::Slot);
        assert_eq!(slot.dimensions(), (300, 200));
        assert!(!Arc::ptr_eq(&slot, &source));
        assert_eq!(source.width(), 150);
        assert!(Arc::ptr_eq(&board.get(Category::Barong).unwrap(), &slot));
    }

    #[test]
    fn test_assign_falls_back_to_source() {
        let dir = tempdir().unwrap();
        let board = board();
        let source = grid_entry(&dir.path().join("gone.jpg"));

        let slot = board.assign(Category::Any, &source);
        assert!(Arc::ptr_eq(&slot, &source));
    }

    #[test]
    fn test_assign_replaces_and_clear() {
        let dir = tempdir().unwrap();
        let a = write_jpeg(dir.path(), "a.jpg", 400, 300);
        let b = write_jpeg(dir.path(), "b.jpg", 400, 300);
        let board = board();

        board.assign(Category::Instax, &grid_entry(&a));
        board.assign(Category::Instax, &grid_entry(&b));
        assert_eq!(board.get(Category::Instax).unwrap().path(), b.as_path());

        board.assign(Category::Creative, &grid_entry(&a));
        assert_eq!(board.occupied(), vec![Category::Creative, Category::Instax]);

        assert!(board.clear(Category::Instax).is_some());
        assert!(board.clear(Category::Instax).is_none());
        board.clear_all();
        assert!(board.occupied().is_empty());
    }

    #[test]
    fn test_package_preview_skips_empty_slots() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 1000, 800);
        let board = board();
        board.assign(Category::EightByTen, &grid_entry(&path));

        let rendered = board.render_package_preview(&Category::ALL);
        assert_eq!(rendered.len(), 1);
        let copy = &rendered[&Category::EightByTen];
        assert_eq!(copy.tier(), Tier::PackagePreview);
        assert_eq!(copy.dimensions(), (500, 400));
    }

    #[tokio::test]
    async fn test_package_preview_async() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 1000, 800);
        let board = board();
        board.assign(Category::Barong, &grid_entry(&path));

        let rendered = board
            .package_preview(vec![Category::Barong, Category::Any])
            .await
            .unwrap();
        assert!(rendered.contains_key(&Category::Barong));
        assert!(!rendered.contains_key(&Category::Any));
    }
}
