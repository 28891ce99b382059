//! Persistent grid-thumbnail cache stored beside the source photos.
//!
//! - Location: `<photo dir>/.photosel_thumbs/<file name>.thumb` (JPEG)
//! - Only widths inside the configured band are read or written
//! - Entries are trusted whenever present; a changed source file with the
//!   same name keeps serving the old thumbnail
//!
//! Every failure degrades to a cache miss. Writes are best effort.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, RgbaImage};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::PipelineConfig;

const THUMB_EXTENSION: &str = "thumb";

/// Cache key for a source photo: its directory plus file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    cache_dir: PathBuf,
    file_name: String,
}

impl ThumbnailKey {
    pub fn new(source: &Path, dir_name: &str) -> Option<Self> {
        let parent = source.parent()?;
        let file_name = source.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            cache_dir: parent.join(dir_name),
            file_name,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Full path of the cached thumbnail file.
    pub fn disk_path(&self) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", self.file_name, THUMB_EXTENSION))
    }
}

pub struct DiskThumbnailCache {
    dir_name: String,
    band: RangeInclusive<u32>,
    quality: u8,
    /// Directories we already complained about.
    warned_dirs: Mutex<HashSet<PathBuf>>,
}

impl DiskThumbnailCache {
    pub fn new(dir_name: impl Into<String>, band: RangeInclusive<u32>, quality: u8) -> Self {
        Self {
            dir_name: dir_name.into(),
            band,
            quality: quality.clamp(1, 100),
            warned_dirs: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.thumb_dir_name.clone(),
            config.disk_band.clone(),
            config.thumb_quality,
        )
    }

    /// Whether decodes at `width` are persisted.
    pub fn accepts(&self, width: u32) -> bool {
        self.band.contains(&width)
    }

    pub fn key(&self, source: &Path) -> Option<ThumbnailKey> {
        ThumbnailKey::new(source, &self.dir_name)
    }

    /// Load the cached thumbnail for `source`, if one exists and `width` is
    /// in the cached band. An unreadable cache file is removed.
    pub fn try_get(&self, source: &Path, width: u32) -> Option<RgbaImage> {
        if !self.accepts(width) {
            return None;
        }
        let disk_path = self.key(source)?.disk_path();
        if !disk_path.is_file() {
            return None;
        }

        match load_thumbnail(&disk_path) {
            Ok(img) => {
                trace!(?source, "Disk cache hit");
                Some(img.into_rgba8())
            }
            Err(e) => {
                warn!(?disk_path, error = ?e, "Discarding unreadable cached thumbnail");
                let _ = std::fs::remove_file(&disk_path);
                None
            }
        }
    }

    /// Persist `img` as the thumbnail for `source`. Widths outside the band
    /// are ignored and failures are logged, never returned.
    pub fn put(&self, source: &Path, width: u32, img: &RgbaImage) {
        if !self.accepts(width) {
            return;
        }
        let Some(key) = self.key(source) else {
            return;
        };
        if let Err(e) = self.write(&key, img) {
            let mut warned = self.warned_dirs.lock();
            if warned.insert(key.cache_dir().to_path_buf()) {
                warn!(cache_dir = ?key.cache_dir(), error = ?e, "Thumbnail cache not writable");
            } else {
                trace!(?source, error = ?e, "Skipped thumbnail cache write");
            }
        }
    }

    fn write(&self, key: &ThumbnailKey, img: &RgbaImage) -> Result<()> {
        let cache_dir = key.cache_dir();
        if !cache_dir.is_dir() {
            std::fs::create_dir_all(cache_dir)
                .with_context(|| format!("Failed to create thumbnail directory: {:?}", cache_dir))?;
            debug!(?cache_dir, "Created thumbnail cache directory");
        }

        let dst = key.disk_path();
        let tmp = dst.with_extension(format!("{}.tmp", THUMB_EXTENSION));
        {
            let file = File::create(&tmp)
                .with_context(|| format!("Failed to create thumbnail file: {:?}", tmp))?;
            let mut writer = BufWriter::new(file);

            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
            rgb.write_with_encoder(encoder)
                .with_context(|| format!("Failed to encode thumbnail: {:?}", tmp))?;
        }
        std::fs::rename(&tmp, &dst)
            .with_context(|| format!("Failed to move thumbnail into place: {:?}", dst))?;

        trace!(?dst, "Saved thumbnail");
        Ok(())
    }
}

/// Cache files carry their own extension, so the format is sniffed.
fn load_thumbnail(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Failed to open cached thumbnail: {:?}", path))?
        .with_guessed_format()
        .context("Failed to guess cached thumbnail format")?
        .decode()
        .with_context(|| format!("Failed to decode cached thumbnail: {:?}", path))
}
