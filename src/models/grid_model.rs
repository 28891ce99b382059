//! Events published by the pipeline and a reference consumer for them.
//!
//! Background work never touches presentation state directly. It sends
//! [`GridEvent`]s and [`PreviewEvent`]s over a channel; whoever owns the UI
//! thread drains them and applies them to a [`ThumbnailGrid`] and a
//! [`PreviewSlot`]. Every event carries the generation of the operation that
//! produced it so that late results from superseded work are dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use super::image_entry::ImageEntry;

#[derive(Debug, Clone)]
pub enum GridEvent {
    /// A new folder load started; the grid must be emptied.
    Reset { generation: u64, folder: PathBuf },
    /// Entries to append, in filename order.
    Batch {
        generation: u64,
        entries: Vec<Arc<ImageEntry>>,
    },
    /// The folder is missing or holds no supported images.
    NoImages { generation: u64 },
    /// An entry's pixels were upgraded in place.
    Upgraded {
        generation: u64,
        entry: Arc<ImageEntry>,
    },
    /// The placeholder pass finished.
    Completed {
        generation: u64,
        total: usize,
        from_cache: bool,
    },
}

impl GridEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Reset { generation, .. }
            | Self::Batch { generation, .. }
            | Self::NoImages { generation }
            | Self::Upgraded { generation, .. }
            | Self::Completed { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PreviewEvent {
    /// Low-fidelity stand-in shown while the real preview decodes.
    Interim {
        generation: u64,
        entry: Arc<ImageEntry>,
    },
    /// The sharpened preview, also resident in the preview cache.
    Final {
        generation: u64,
        entry: Arc<ImageEntry>,
    },
    /// The preview could not be produced; the interim stays up.
    Failed { generation: u64, path: PathBuf },
    /// Selection was cleared.
    Cleared { generation: u64 },
}

impl PreviewEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Interim { generation, .. }
            | Self::Final { generation, .. }
            | Self::Failed { generation, .. }
            | Self::Cleared { generation } => *generation,
        }
    }
}

/// Ordered thumbnail collection as the grid view sees it.
#[derive(Debug, Default)]
pub struct ThumbnailGrid {
    generation: u64,
    folder: Option<PathBuf>,
    entries: Vec<Arc<ImageEntry>>,
    no_images: bool,
    loading: bool,
    active: bool,
}

impl ThumbnailGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns false when the event belongs to a
    /// superseded load and was ignored.
    pub fn apply(&mut self, event: GridEvent) -> bool {
        let generation = event.generation();
        match event {
            GridEvent::Reset { folder, .. } if generation >= self.generation => {
                self.generation = generation;
                self.folder = Some(folder);
                self.entries.clear();
                self.no_images = false;
                self.loading = true;
                self.active = true;
                true
            }
            _ if generation != self.generation || !self.active => {
                trace!(generation, current = self.generation, "Dropping stale grid event");
                false
            }
            GridEvent::Reset { .. } => false,
            GridEvent::Batch { entries, .. } => {
                self.entries.extend(entries);
                true
            }
            GridEvent::NoImages { .. } => {
                self.entries.clear();
                self.no_images = true;
                self.loading = false;
                true
            }
            GridEvent::Upgraded { .. } => true,
            GridEvent::Completed { .. } => {
                self.loading = false;
                true
            }
        }
    }

    /// Forget the current folder; pending events for it are ignored.
    pub fn clear(&mut self) {
        self.active = false;
        self.folder = None;
        self.entries.clear();
        self.no_images = false;
        self.loading = false;
    }

    pub fn entries(&self) -> &[Arc<ImageEntry>] {
        &self.entries
    }

    pub fn file_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.file_name().to_string())
            .collect()
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_no_images(&self) -> bool {
        self.no_images
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

/// The single preview pane.
#[derive(Debug, Default)]
pub struct PreviewSlot {
    generation: u64,
    current: Option<Arc<ImageEntry>>,
    is_final: bool,
    loading: bool,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: PreviewEvent) -> bool {
        let generation = event.generation();
        if generation < self.generation {
            trace!(generation, current = self.generation, "Dropping stale preview event");
            return false;
        }
        self.generation = generation;
        match event {
            PreviewEvent::Interim { entry, .. } => {
                self.current = Some(entry);
                self.is_final = false;
                self.loading = true;
            }
            PreviewEvent::Final { entry, .. } => {
                self.current = Some(entry);
                self.is_final = true;
                self.loading = false;
            }
            PreviewEvent::Failed { .. } => {
                self.loading = false;
            }
            PreviewEvent::Cleared { .. } => {
                self.current = None;
                self.is_final = false;
                self.loading = false;
            }
        }
        true
    }

    pub fn current(&self) -> Option<&Arc<ImageEntry>> {
        self.current.as_ref()
    }

    /// True once the sharpened preview replaced the interim one.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_loading_preview(&self) -> bool {
        self.loading
    }
}
