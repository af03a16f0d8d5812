//! Error types for the resource tracker

use std::path::PathBuf;
use thiserror::Error;

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, ResourceError>;

/// Errors that can occur while tracking resources
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Resource type handle does not name a registered type
    #[error("Unknown resource type")]
    UnknownType,

    /// Resource handle is stale or belongs to another type
    #[error("Unknown resource")]
    UnknownResource,

    /// Lock handle was never issued or already released
    #[error("Unknown resource lock")]
    UnknownLock,

    /// The file could not be stat'ed when it was added
    #[error("Failed to stat '{path}': {source}")]
    StatFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reference count would drop below zero
    #[error("Reference count underflow for '{0}'")]
    RefUnderflow(PathBuf),
}
