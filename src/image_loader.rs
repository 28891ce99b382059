use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use tracing::trace;

use crate::decode::{BitmapDecoder, DecodeError};
use crate::models::Rotation;
use crate::thumbnails::DiskThumbnailCache;

/// Disk cache first, decoder second. Decodes at a cached width are written
/// back to the disk cache.
#[derive(Clone)]
pub struct ImageLoader {
    decoder: Arc<BitmapDecoder>,
    disk: Arc<DiskThumbnailCache>,
}

impl ImageLoader {
    pub fn new(decoder: Arc<BitmapDecoder>, disk: Arc<DiskThumbnailCache>) -> Self {
        Self { decoder, disk }
    }

    /// Cached thumbnail only; never decodes the source.
    pub fn cached(&self, path: &Path, width: u32) -> Option<RgbaImage> {
        self.disk.try_get(path, width)
    }

    pub fn load(
        &self,
        path: &Path,
        width: u32,
        rotation: Rotation,
    ) -> Result<RgbaImage, DecodeError> {
        if let Some(img) = self.disk.try_get(path, width) {
            return Ok(img);
        }

        let img = self.decoder.decode(path, Some(width), rotation)?;
        if self.disk.accepts(width) {
            self.disk.put(path, width, &img);
        } else {
            trace!(?path, width, "Width outside disk cache band");
        }
        Ok(img)
    }

    pub fn decoder(&self) -> &Arc<BitmapDecoder> {
        &self.decoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::test_util::write_jpeg;
    use tempfile::tempdir;

    fn loader() -> ImageLoader {
        ImageLoader::new(
            Arc::new(BitmapDecoder::new()),
            Arc::new(DiskThumbnailCache::from_config(&PipelineConfig::default())),
        )
    }

    #[test]
    fn test_grid_width_persists_and_hits() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 400, 300);
        let loader = loader();

        assert!(loader.cached(&path, 150).is_none());
        let first = loader.load(&path, 150, Rotation::None).unwrap();
        assert_eq!(first.width(), 150);
        assert_eq!(loader.decoder().decode_count(), 1);

        let second = loader.load(&path, 150, Rotation::None).unwrap();
        assert_eq!(second.dimensions(), first.dimensions());
        assert_eq!(loader.decoder().decode_count(), 1);
        assert!(loader.cached(&path, 150).is_some());
    }

    #[test]
    fn test_other_widths_always_decode() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 400, 300);
        let loader = loader();

        loader.load(&path, 50, Rotation::None).unwrap();
        loader.load(&path, 50, Rotation::None).unwrap();
        loader.load(&path, 300, Rotation::None).unwrap();
        assert_eq!(loader.decoder().decode_count(), 3);
        assert!(!dir.path().join(".photosel_thumbs").exists());
    }
}
