pub mod cache;
pub mod queue;

pub use cache::{DiskThumbnailCache, ThumbnailKey};
pub use queue::{UpgradeJob, UpgradeQueue, UpgradeQueueBuilder};
