use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;

/// Clockwise rotation needed to bring stored pixels into display orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }
}

/// Resolution tier an entry's pixels were produced at, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Placeholder,
    Grid,
    Slot,
    PackagePreview,
    Preview,
}

#[derive(Debug)]
struct Pixels {
    bitmap: Arc<RgbaImage>,
    tier: Tier,
}

/// A decoded photo shared by the grid, caches and slots.
///
/// Entries are handed around as `Arc<ImageEntry>`; the pixel buffer is freed
/// when the last owner drops it or when a higher tier replaces it.
#[derive(Debug)]
pub struct ImageEntry {
    file_name: String,
    path: PathBuf,
    rotation: Rotation,
    pixels: RwLock<Pixels>,
}

impl ImageEntry {
    pub fn new(path: &Path, bitmap: RgbaImage, tier: Tier, rotation: Rotation) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string());
        Self {
            file_name,
            path: path.to_path_buf(),
            rotation,
            pixels: RwLock::new(Pixels {
                bitmap: Arc::new(bitmap),
                tier,
            }),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Current pixel buffer. Holding the returned handle keeps it alive
    /// across a concurrent [`replace_pixels`](Self::replace_pixels).
    pub fn bitmap(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels.read().bitmap)
    }

    pub fn tier(&self) -> Tier {
        self.pixels.read().tier
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.read().bitmap.dimensions()
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    /// Swap in a new buffer; the old one is released once no reader holds it.
    pub fn replace_pixels(&self, bitmap: RgbaImage, tier: Tier) {
        let old = {
            let mut pixels = self.pixels.write();
            let old = std::mem::replace(&mut pixels.bitmap, Arc::new(bitmap));
            pixels.tier = tier;
            old
        };
        drop(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_degrees() {
        assert_eq!(Rotation::default().degrees(), 0);
        assert_eq!(Rotation::Cw90.degrees(), 90);
        assert_eq!(Rotation::Cw180.degrees(), 180);
        assert_eq!(Rotation::Cw270.degrees(), 270);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Placeholder < Tier::Grid);
        assert!(Tier::Grid < Tier::Slot);
        assert!(Tier::Slot < Tier::Preview);
    }

    #[test]
    fn test_replace_pixels_keeps_outstanding_handles() {
        let entry = ImageEntry::new(
            Path::new("/photos/a.jpg"),
            RgbaImage::new(50, 25),
            Tier::Placeholder,
            Rotation::None,
        );
        assert_eq!(entry.file_name(), "a.jpg");

        let old = entry.bitmap();
        entry.replace_pixels(RgbaImage::new(150, 75), Tier::Grid);

        assert_eq!(old.width(), 50);
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(entry.dimensions(), (150, 75));
        assert_eq!(entry.tier(), Tier::Grid);
    }
}
