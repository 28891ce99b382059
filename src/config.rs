//! Pipeline tunables and start-up settings.
//!
//! Every width, capacity and pacing value used by the loader lives in
//! [`PipelineConfig`]. Defaults are the product values; a handful can be
//! overridden through `PHOTOSEL_*` environment variables.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, UserDirs};
use tracing::debug;

/// Width of the fast placeholder decode.
pub const PLACEHOLDER_WIDTH: u32 = 50;
/// Width of a grid thumbnail (the disk-cached tier).
pub const GRID_WIDTH: u32 = 150;
/// Width of a category slot copy.
pub const SLOT_WIDTH: u32 = 300;
/// Width of the copies shown in the package confirmation view.
pub const PACKAGE_PREVIEW_WIDTH: u32 = 500;
/// Width of the sharpened preview.
pub const PREVIEW_WIDTH: u32 = 1500;
/// Entries wider than this are not upgraded again.
pub const UPGRADE_SKIP_WIDTH: u32 = 100;

const DEFAULT_PREVIEW_CACHE: usize = 20;
const DEFAULT_FOLDER_CACHE: usize = 5;
const DEFAULT_BATCH_SIZE: usize = 20;
const DEFAULT_UPGRADE_PAUSE_MS: u64 = 5;
const DEFAULT_THUMB_QUALITY: u8 = 80;
const DEFAULT_THUMB_DIR: &str = ".photosel_thumbs";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub placeholder_width: u32,
    pub grid_width: u32,
    pub slot_width: u32,
    pub package_preview_width: u32,
    pub preview_width: u32,
    /// Widths persisted to the disk thumbnail cache.
    pub disk_band: RangeInclusive<u32>,
    pub upgrade_skip_width: u32,
    pub preview_cache_capacity: usize,
    pub folder_cache_capacity: usize,
    pub batch_size: usize,
    pub upgrade_pause: Duration,
    pub thumb_quality: u8,
    /// Name of the hidden directory created beside source photos.
    pub thumb_dir_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            placeholder_width: PLACEHOLDER_WIDTH,
            grid_width: GRID_WIDTH,
            slot_width: SLOT_WIDTH,
            package_preview_width: PACKAGE_PREVIEW_WIDTH,
            preview_width: PREVIEW_WIDTH,
            disk_band: 100..=200,
            upgrade_skip_width: UPGRADE_SKIP_WIDTH,
            preview_cache_capacity: DEFAULT_PREVIEW_CACHE,
            folder_cache_capacity: DEFAULT_FOLDER_CACHE,
            batch_size: DEFAULT_BATCH_SIZE,
            upgrade_pause: Duration::from_millis(DEFAULT_UPGRADE_PAUSE_MS),
            thumb_quality: DEFAULT_THUMB_QUALITY,
            thumb_dir_name: DEFAULT_THUMB_DIR.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with `PHOTOSEL_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_usize("PHOTOSEL_PREVIEW_CACHE") {
            config.preview_cache_capacity = n;
        }
        if let Some(n) = env_usize("PHOTOSEL_FOLDER_CACHE") {
            config.folder_cache_capacity = n;
        }
        if let Some(n) = env_usize("PHOTOSEL_BATCH_SIZE") {
            config.batch_size = n;
        }
        if let Some(n) = env_usize("PHOTOSEL_PREVIEW_WIDTH") {
            config.preview_width = n.min(u16::MAX as usize) as u32;
        }
        if let Some(ms) = std::env::var("PHOTOSEL_UPGRADE_PAUSE_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.upgrade_pause = Duration::from_millis(ms);
        }
        debug!(?config, "Loaded pipeline config");
        config
    }

    /// Whether a decode at `width` goes through the disk thumbnail cache.
    pub fn is_disk_cached(&self, width: u32) -> bool {
        self.disk_band.contains(&width)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}

/// Settings handed over by the settings store at start-up.
#[derive(Debug, Clone, Default)]
pub struct StartupSettings {
    pub last_browse_folder: Option<PathBuf>,
}

impl StartupSettings {
    /// The folder to browse first: the last one used if it still exists,
    /// otherwise the user's pictures directory, otherwise home.
    pub fn resolve_start_folder(&self) -> Option<PathBuf> {
        if let Some(last) = self.last_browse_folder.as_deref().filter(|p| p.is_dir()) {
            return Some(last.to_path_buf());
        }
        default_pictures_dir()
    }
}

fn default_pictures_dir() -> Option<PathBuf> {
    UserDirs::new()
        .and_then(|dirs| dirs.picture_dir().map(Path::to_path_buf))
        .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()))
}
