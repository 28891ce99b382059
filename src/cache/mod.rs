pub mod folder_cache;
pub mod preview_cache;

pub use folder_cache::{FolderCache, FolderEntries};
pub use preview_cache::PreviewCache;
