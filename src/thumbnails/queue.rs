//! Background upgrade of placeholder thumbnails.
//!
//! - One worker thread drains a FIFO of [`UpgradeJob`]s
//! - Each job decodes the entry at grid width (persisting it to the disk
//!   cache) and swaps the pixels in place
//! - Jobs carry the cancel token of the load that queued them; jobs from a
//!   superseded load are skipped and [`UpgradeQueue::clear`] drops them
//!   wholesale
//! - Results are announced on the grid event channel

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::cancel::CancelToken;
use crate::config::{PipelineConfig, GRID_WIDTH, UPGRADE_SKIP_WIDTH};
use crate::image_loader::ImageLoader;
use crate::models::{GridEvent, ImageEntry, Tier};

/// How long the worker blocks on an empty queue before rechecking shutdown.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct UpgradeJob {
    pub entry: Arc<ImageEntry>,
    pub token: CancelToken,
}

#[derive(Debug, Clone, Copy)]
struct UpgradeSettings {
    grid_width: u32,
    skip_width: u32,
    pause: Duration,
}

pub struct UpgradeQueue {
    job_tx: Sender<UpgradeJob>,
    /// Kept so that `clear` can drain jobs the worker hasn't taken yet.
    job_rx: Receiver<UpgradeJob>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Jobs queued or being processed.
    in_flight: Arc<AtomicUsize>,
}

impl UpgradeQueue {
    pub fn builder() -> UpgradeQueueBuilder {
        UpgradeQueueBuilder::new()
    }

    fn start(
        settings: UpgradeSettings,
        loader: ImageLoader,
        events: Sender<GridEvent>,
    ) -> Result<Self> {
        let (job_tx, job_rx) = flume::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let worker = {
            let rx = job_rx.clone();
            let shutdown = Arc::clone(&shutdown);
            let in_flight = Arc::clone(&in_flight);
            thread::Builder::new()
                .name("thumb-upgrade".to_string())
                .spawn(move || worker_loop(rx, shutdown, in_flight, settings, loader, events))
                .context("Failed to spawn upgrade worker")?
        };

        debug!(grid_width = settings.grid_width, "Started upgrade worker");

        Ok(Self {
            job_tx,
            job_rx,
            worker: Some(worker),
            shutdown,
            in_flight,
        })
    }

    /// Queue `entry` for upgrade under the load identified by `token`.
    pub fn enqueue(&self, entry: Arc<ImageEntry>, token: CancelToken) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.job_tx.send(UpgradeJob { entry, token }) {
            Ok(()) => true,
            Err(_) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                warn!("Upgrade queue disconnected");
                false
            }
        }
    }

    /// Drop every job the worker hasn't started. Returns how many were
    /// dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.job_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            self.in_flight.fetch_sub(dropped, Ordering::SeqCst);
            debug!(dropped, "Cleared upgrade queue");
        }
        dropped
    }

    /// Jobs waiting to be picked up.
    pub fn pending(&self) -> usize {
        self.job_rx.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Block until the queue drains or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    pub fn shutdown(&mut self) {
        debug!("Shutting down upgrade worker");
        self.shutdown.store(true, Ordering::SeqCst);
        self.clear();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UpgradeQueue {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::Relaxed) {
            self.shutdown();
        }
    }
}

fn worker_loop(
    rx: Receiver<UpgradeJob>,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    settings: UpgradeSettings,
    loader: ImageLoader,
    events: Sender<GridEvent>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(IDLE_POLL) {
            Ok(job) => {
                let worked = process_job(&job, &settings, &loader, &events);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if worked && !settings.pause.is_zero() {
                    thread::sleep(settings.pause);
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Upgrade worker stopped");
}

/// Returns true when a decode was attempted.
fn process_job(
    job: &UpgradeJob,
    settings: &UpgradeSettings,
    loader: &ImageLoader,
    events: &Sender<GridEvent>,
) -> bool {
    let entry = &job.entry;
    if job.token.is_cancelled() {
        trace!(path = ?entry.path(), "Skipping upgrade for superseded load");
        return false;
    }
    if entry.tier() >= Tier::Grid || entry.width() > settings.skip_width {
        trace!(path = ?entry.path(), "Already upgraded");
        return false;
    }

    match loader.load(entry.path(), settings.grid_width, entry.rotation()) {
        Ok(img) => {
            if job.token.is_cancelled() {
                return true;
            }
            entry.replace_pixels(img, Tier::Grid);
            let _ = events.send(GridEvent::Upgraded {
                generation: job.token.generation(),
                entry: Arc::clone(entry),
            });
        }
        Err(e) => {
            debug!(path = ?entry.path(), error = %e, "Upgrade decode failed");
        }
    }
    true
}

/// Builder for [`UpgradeQueue`].
pub struct UpgradeQueueBuilder {
    settings: UpgradeSettings,
}

impl UpgradeQueueBuilder {
    pub fn new() -> Self {
        Self {
            settings: UpgradeSettings {
                grid_width: GRID_WIDTH,
                skip_width: UPGRADE_SKIP_WIDTH,
                pause: Duration::from_millis(5),
            },
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new()
            .grid_width(config.grid_width)
            .skip_width(config.upgrade_skip_width)
            .pause(config.upgrade_pause)
    }

    pub fn grid_width(mut self, width: u32) -> Self {
        self.settings.grid_width = width;
        self
    }

    pub fn skip_width(mut self, width: u32) -> Self {
        self.settings.skip_width = width;
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.settings.pause = pause;
        self
    }

    pub fn build(self, loader: ImageLoader, events: Sender<GridEvent>) -> Result<UpgradeQueue> {
        UpgradeQueue::start(self.settings, loader, events)
    }
}

impl Default for UpgradeQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
