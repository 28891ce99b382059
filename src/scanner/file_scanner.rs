//! Discovery of supported photos in a folder.
//!
//! Only the folder itself is listed (no recursion). Matching is by extension,
//! case-insensitively, and results are ordered by file name so every load of
//! the same folder publishes in the same order.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::cancel::CancelToken;

/// Source formats the pipeline decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFormat {
    Jpeg,
    Png,
}

impl PhotoFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileScanner;

impl FileScanner {
    pub fn new() -> Self {
        Self
    }

    /// Supported photos directly inside `dir`, sorted by file name.
    /// Returns `Ok(None)` once `token` is cancelled.
    pub fn discover(&self, dir: &Path, token: &CancelToken) -> Result<Option<Vec<PathBuf>>> {
        if !dir.is_dir() {
            bail!("Not a directory: {:?}", dir);
        }

        let walker = WalkDir::new(dir).min_depth(1).max_depth(1);

        let mut files = Vec::new();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if token.is_cancelled() {
                trace!(?dir, "Discovery superseded");
                return Ok(None);
            }
            if !entry.file_type().is_file() && !entry.path().is_file() {
                continue;
            }
            if PhotoFormat::from_path(entry.path()).is_none() {
                trace!(path = ?entry.path(), "Skipping unsupported file");
                continue;
            }
            files.push(entry.into_path());
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        debug!(?dir, count = files.len(), "Discovered photos");
        Ok(Some(files))
    }
}
