//! Error types for the kernel

use mosaic_module::ModuleError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors that can occur during startup, configuration or shutdown
#[derive(Debug, Error)]
pub enum KernelError {
    /// Loading or resolving modules failed
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// A required system's init returned failure
    #[error("Failed to Init Required System '{system}'")]
    InitFailed { system: String },

    /// No system with this name was ever added
    #[error("Unknown system '{system}'")]
    UnknownSystem { system: String },

    /// A resolved interface has no lifecycle table
    #[error("Interface '{interface}' is not a system")]
    NotASystem { interface: String },

    /// App info file could not be read
    #[error("Failed to read app info '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// App info file is not valid TOML for the schema
    #[error("Failed to parse app info '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Convar archive could not be read or written
    #[error("Convar archive '{path}': {source}")]
    ArchiveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Convar archive is not valid TOML
    #[error("Failed to parse convar archive '{path}': {source}")]
    ArchiveParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize convar archive: {0}")]
    ArchiveSerialize(#[from] toml::ser::Error),
}

impl KernelError {
    pub fn init_failed(system: impl Into<String>) -> Self {
        Self::InitFailed {
            system: system.into(),
        }
    }
}
