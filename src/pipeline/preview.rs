//! Preview generation for the current selection.
//!
//! Selecting an entry shows its grid bitmap straight away as an interim
//! preview and asks the preview worker for the real one: decoded at preview
//! width, orientation corrected and sharpened. The worker only ever works on
//! the newest request; anything older is dropped before it starts.
//!
//! Bumping the selection generation, checking a token and the cache insert
//! plus publish of a finished preview all happen under one lock, so a
//! superseded preview is never cached and never shown.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::{self, JoinError};
use tracing::{debug, trace};

use crate::cache::PreviewCache;
use crate::cancel::{CancelToken, LoadGeneration};
use crate::decode::{read_orientation, sharpen, BitmapDecoder, DecodeError};
use crate::models::{ImageEntry, PreviewEvent, Tier};

const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview superseded by a newer selection")]
    Cancelled,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("preview task failed: {0}")]
    Task(#[from] JoinError),
}

struct PreviewRequest {
    entry: Arc<ImageEntry>,
    token: CancelToken,
}

struct Shared {
    decoder: Arc<BitmapDecoder>,
    cache: Arc<PreviewCache>,
    width: u32,
    publish_lock: Mutex<()>,
    events: Sender<PreviewEvent>,
}

impl Shared {
    fn generate(
        &self,
        path: &Path,
        token: &CancelToken,
        publish: bool,
    ) -> Result<Arc<ImageEntry>, PreviewError> {
        if token.is_cancelled() {
            return Err(PreviewError::Cancelled);
        }

        let rendered = match self.cache.get(path) {
            Some(hit) => {
                trace!(?path, "Preview cache hit");
                hit
            }
            None => Arc::new(self.render(path, token)?),
        };

        let _guard = self.publish_lock.lock();
        if token.is_cancelled() {
            trace!(?path, generation = token.generation(), "Preview superseded");
            return Err(PreviewError::Cancelled);
        }

        // Another caller may have finished the same path first.
        let entry = match self.cache.get(path) {
            Some(existing) => existing,
            None => {
                if let Some(evicted) = self.cache.put(path.to_path_buf(), Arc::clone(&rendered)) {
                    trace!(path = ?evicted.path(), "Preview evicted");
                }
                rendered
            }
        };

        if publish {
            self.cache.pin(Some(path));
            let _ = self.events.send(PreviewEvent::Final {
                generation: token.generation(),
                entry: Arc::clone(&entry),
            });
        }
        Ok(entry)
    }

    fn render(&self, path: &Path, token: &CancelToken) -> Result<ImageEntry, PreviewError> {
        let rotation = read_orientation(path);
        let decoded = self.decoder.decode(path, Some(self.width), rotation)?;
        if token.is_cancelled() {
            trace!(?path, "Preview superseded after decode");
            return Err(PreviewError::Cancelled);
        }
        let sharpened = sharpen(&decoded);
        Ok(ImageEntry::new(path, sharpened, Tier::Preview, rotation))
    }

    fn publish_failure(&self, path: &Path, token: &CancelToken) {
        let _guard = self.publish_lock.lock();
        if token.is_cancelled() {
            return;
        }
        let _ = self.events.send(PreviewEvent::Failed {
            generation: token.generation(),
            path: path.to_path_buf(),
        });
    }
}

pub struct PreviewGenerator {
    shared: Arc<Shared>,
    generation: LoadGeneration,
    request_tx: Sender<PreviewRequest>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PreviewGenerator {
    pub fn new(
        decoder: Arc<BitmapDecoder>,
        cache: Arc<PreviewCache>,
        width: u32,
        events: Sender<PreviewEvent>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            decoder,
            cache,
            width,
            publish_lock: Mutex::new(()),
            events,
        });
        let (request_tx, request_rx) = flume::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("preview".to_string())
                .spawn(move || worker_loop(request_rx, shutdown, shared))
                .context("Failed to spawn preview worker")?
        };

        debug!(width, "Started preview worker");

        Ok(Self {
            shared,
            generation: LoadGeneration::new(),
            request_tx,
            worker: Some(worker),
            shutdown,
        })
    }

    /// Supersede whatever preview is in flight and hand out a token for the
    /// next one.
    pub fn begin(&self) -> CancelToken {
        let _guard = self.shared.publish_lock.lock();
        self.generation.begin()
    }

    /// Produce the preview for `path` on the calling thread. Returns the
    /// cached preview when there is one; otherwise decodes, sharpens and
    /// caches it unless `token` is cancelled first. Nothing is published.
    pub fn generate(&self, path: &Path, token: &CancelToken) -> Result<Arc<ImageEntry>, PreviewError> {
        self.shared.generate(path, token, false)
    }

    /// Change the selection. Returns the generation of the new selection;
    /// every [`PreviewEvent`] for it carries that generation.
    pub fn select(&self, entry: Option<Arc<ImageEntry>>) -> u64 {
        let shared = &self.shared;
        let _guard = shared.publish_lock.lock();
        let token = self.generation.begin();
        let generation = token.generation();

        let Some(entry) = entry else {
            shared.cache.pin(None);
            let _ = shared.events.send(PreviewEvent::Cleared { generation });
            debug!(generation, "Preview cleared");
            return generation;
        };

        let path = entry.path();
        if let Some(hit) = shared.cache.get(path) {
            shared.cache.pin(Some(path));
            let _ = shared.events.send(PreviewEvent::Final {
                generation,
                entry: hit,
            });
            debug!(?path, generation, "Preview served from cache");
            return generation;
        }

        shared.cache.pin(None);
        let _ = shared.events.send(PreviewEvent::Interim {
            generation,
            entry: Arc::clone(&entry),
        });
        debug!(?path, generation, "Preview requested");
        if self.request_tx.send(PreviewRequest { entry, token }).is_err() {
            debug!("Preview worker gone");
        }
        generation
    }

    /// Select `entry` and wait for its preview on the blocking pool. Like
    /// [`select`](Self::select), the entry goes out as the interim preview
    /// unless a cached preview exists; the result is published as final.
    pub async fn preview(&self, entry: Arc<ImageEntry>) -> Result<Arc<ImageEntry>, PreviewError> {
        let token = {
            let _guard = self.shared.publish_lock.lock();
            let token = self.generation.begin();
            if !self.shared.cache.contains(entry.path()) {
                self.shared.cache.pin(None);
                let _ = self.shared.events.send(PreviewEvent::Interim {
                    generation: token.generation(),
                    entry: Arc::clone(&entry),
                });
            }
            token
        };
        debug!(path = ?entry.path(), generation = token.generation(), "Preview requested");

        let shared = Arc::clone(&self.shared);
        let path = entry.path().to_path_buf();
        task::spawn_blocking(move || shared.generate(&path, &token, true)).await?
    }

    pub fn cache(&self) -> &Arc<PreviewCache> {
        &self.shared.cache
    }

    pub fn shutdown(&mut self) {
        debug!("Shutting down preview worker");
        self.shutdown.store(true, Ordering::SeqCst);
        self.generation.cancel();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PreviewGenerator {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::Relaxed) {
            self.shutdown();
        }
    }
}

fn worker_loop(rx: Receiver<PreviewRequest>, shutdown: Arc<AtomicBool>, shared: Arc<Shared>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let mut request = match rx.recv_timeout(IDLE_POLL) {
            Ok(request) => request,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };
        // Only the newest selection matters.
        while let Ok(next) = rx.try_recv() {
            request = next;
        }

        let path = request.entry.path();
        match shared.generate(path, &request.token, true) {
            Ok(entry) => {
                let (width, height) = entry.dimensions();
                debug!(?path, width, height, "Preview ready");
            }
            Err(PreviewError::Cancelled) => {}
            Err(e) => {
                debug!(?path, error = %e, "Preview failed");
                shared.publish_failure(path, &request.token);
            }
        }
    }

    debug!("Preview worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PREVIEW_WIDTH;
    use crate::models::{PreviewSlot, Rotation};
    use crate::test_util::{is_blue, is_red, split_image, write_jpeg, write_jpeg_oriented};
    use image::RgbaImage;
    use std::fs;
    use tempfile::tempdir;

    const WAIT: Duration = Duration::from_secs(10);

    fn generator(capacity: usize) -> (PreviewGenerator, Receiver<PreviewEvent>) {
        let (tx, rx) = flume::unbounded();
        let generator = PreviewGenerator::new(
            Arc::new(BitmapDecoder::new()),
            Arc::new(PreviewCache::new(capacity)),
            PREVIEW_WIDTH,
            tx,
        )
        .unwrap();
        (generator, rx)
    }

    fn grid_entry(path: &Path) -> Arc<ImageEntry> {
        Arc::new(ImageEntry::new(
            path,
            RgbaImage::new(150, 112),
            Tier::Grid,
            Rotation::None,
        ))
    }

    /// Apply events until the slot shows a final preview or a failure.
    fn settle(rx: &Receiver<PreviewEvent>, slot: &mut PreviewSlot, generation: u64) {
        while let Ok(event) = rx.recv_timeout(WAIT) {
            let done = event.generation() == generation
                && matches!(
                    event,
                    PreviewEvent::Final { .. } | PreviewEvent::Failed { .. }
                );
            slot.apply(event);
            if done {
                return;
            }
        }
        panic!("no preview for generation {}", generation);
    }

    #[test]
    fn test_generate_caches_sharpened_preview() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 2000, 1000);
        let (generator, _rx) = generator(20);

        let token = generator.begin();
        let entry = generator.generate(&path, &token).unwrap();
        assert_eq!(entry.dimensions(), (1500, 750));
        assert_eq!(entry.tier(), Tier::Preview);
        assert!(generator.cache().contains(&path));

        let decodes = generator.shared.decoder.decode_count();
        let again = generator.generate(&path, &token).unwrap();
        assert!(Arc::ptr_eq(&entry, &again));
        assert_eq!(generator.shared.decoder.decode_count(), decodes);
    }

    #[test]
    fn test_generate_applies_orientation() {
        let dir = tempdir().unwrap();
        let path = write_jpeg_oriented(dir.path(), "r.jpg", &split_image(400, 200), Some(6));
        let (generator, _rx) = generator(20);

        let entry = generator.generate(&path, &generator.begin()).unwrap();
        assert_eq!(entry.dimensions(), (200, 400));
        let bitmap = entry.bitmap();
        // Left half (red) ends up on top after a clockwise quarter turn.
        assert!(is_red(bitmap.get_pixel(100, 40)));
        assert!(is_blue(bitmap.get_pixel(100, 360)));
    }

    #[test]
    fn test_superseded_preview_is_neither_cached_nor_returned() {
        let dir = tempdir().unwrap();
        let a = write_jpeg(dir.path(), "a.jpg", 800, 600);
        let b = write_jpeg(dir.path(), "b.jpg", 800, 600);
        let (generator, _rx) = generator(20);

        let token_a = generator.begin();
        let token_b = generator.begin();

        assert!(matches!(
            generator.generate(&a, &token_a),
            Err(PreviewError::Cancelled)
        ));
        assert!(!generator.cache().contains(&a));

        generator.generate(&b, &token_b).unwrap();
        assert!(generator.cache().contains(&b));
    }

    #[test]
    fn test_select_publishes_interim_then_final() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 800, 600);
        let (generator, rx) = generator(20);
        let grid = grid_entry(&path);

        let generation = generator.select(Some(Arc::clone(&grid)));
        match rx.recv_timeout(WAIT).unwrap() {
            PreviewEvent::Interim { entry, .. } => assert!(Arc::ptr_eq(&entry, &grid)),
            other => panic!("unexpected event {:?}", other),
        }

        let mut slot = PreviewSlot::new();
        settle(&rx, &mut slot, generation);
        assert!(slot.is_final());
        assert_eq!(slot.current().unwrap().dimensions(), (800, 600));
        assert_eq!(generator.cache().pinned(), Some(path.clone()));
    }

    #[test]
    fn test_reselecting_cached_preview_skips_decode() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 800, 600);
        let (generator, rx) = generator(20);
        let mut slot = PreviewSlot::new();

        let generation = generator.select(Some(grid_entry(&path)));
        settle(&rx, &mut slot, generation);
        let decodes = generator.shared.decoder.decode_count();

        let generation = generator.select(Some(grid_entry(&path)));
        match rx.recv_timeout(WAIT).unwrap() {
            PreviewEvent::Final { generation: g, .. } => assert_eq!(g, generation),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(generator.shared.decoder.decode_count(), decodes);
    }

    #[test]
    fn test_rapid_reselect_ends_on_latest() {
        let dir = tempdir().unwrap();
        let a = write_jpeg(dir.path(), "a.jpg", 1600, 1200);
        let b = write_jpeg(dir.path(), "b.jpg", 800, 600);
        let (generator, rx) = generator(20);
        let mut slot = PreviewSlot::new();

        generator.select(Some(grid_entry(&a)));
        let generation = generator.select(Some(grid_entry(&b)));
        settle(&rx, &mut slot, generation);

        let shown = slot.current().unwrap();
        assert_eq!(shown.path(), b.as_path());
        assert!(slot.is_final());
        assert_eq!(generator.cache().pinned(), Some(b.clone()));
    }

    #[test]
    fn test_failed_decode_keeps_interim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"\xFF\xD8not really a jpeg").unwrap();
        let (generator, rx) = generator(20);
        let mut slot = PreviewSlot::new();
        let grid = grid_entry(&path);

        let generation = generator.select(Some(Arc::clone(&grid)));
        settle(&rx, &mut slot, generation);
        assert!(!slot.is_final());
        assert!(!slot.is_loading_preview());
        assert!(Arc::ptr_eq(slot.current().unwrap(), &grid));
        assert!(!generator.cache().contains(&path));
    }

    #[test]
    fn test_clear_selection_unpins() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 400, 300);
        let (generator, rx) = generator(20);
        let mut slot = PreviewSlot::new();

        let generation = generator.select(Some(grid_entry(&path)));
        settle(&rx, &mut slot, generation);

        let generation = generator.select(None);
        let event = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(event.generation(), generation);
        slot.apply(event);
        assert!(slot.current().is_none());
        assert_eq!(generator.cache().pinned(), None);
    }

    #[tokio::test]
    async fn test_preview_async() {
        let dir = tempdir().unwrap();
        let path = write_jpeg(dir.path(), "a.jpg", 640, 480);
        let (generator, rx) = generator(20);

        let grid = grid_entry(&path);

        let entry = generator.preview(Arc::clone(&grid)).await.unwrap();
        assert_eq!(entry.dimensions(), (640, 480));
        match rx.try_recv().unwrap() {
            PreviewEvent::Interim { entry: interim, .. } => assert!(Arc::ptr_eq(&interim, &grid)),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv().unwrap(), PreviewEvent::Final { .. }));
        assert_eq!(generator.cache().pinned(), Some(path));

        // A cached preview goes straight to final.
        generator.preview(grid).await.unwrap();
        assert!(matches!(rx.try_recv().unwrap(), PreviewEvent::Final { .. }));
        assert!(rx.try_recv().is_err());
    }
}
