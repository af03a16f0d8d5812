//! # mosaic_resource - Resource Change Tracking
//!
//! Tracks on-disk assets per resource type and drives hot-reload by polling
//! file fingerprints once per tick. No filesystem event subscription is used.
//!
//! ## Example
//!
//! ```ignore
//! use mosaic_resource::{ResourceTracker, ResourceType};
//!
//! let mut tracker = ResourceTracker::new();
//! let textures = tracker.register_type(
//!     ResourceType::new("texture").with_reload(|id, path| reload_texture(id, path)),
//! );
//! tracker.track(textures, "assets/stone.png")?;
//!
//! // once per frame
//! tracker.poll();
//! ```

mod error;
mod stat;
mod tracker;

pub use error::{ResourceError, Result};
pub use stat::{FileStat, Fingerprint, FingerprintChange, MemoryFileStat, StdFileStat};
pub use tracker::{
    LockEntry, LockId, PollReport, ReloadFn, ResourceId, ResourceLockGuard, ResourceRecord,
    ResourceTracker, ResourceType, ResourceTypeEntry, ResourceTypeId,
};
